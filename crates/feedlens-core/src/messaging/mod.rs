//! Cross-context messaging.
//!
//! Two separate concerns:
//! - **accept**: an `ANALYZE_POST` request travels over an mpsc channel to the
//!   orchestrator and is answered by a oneshot [`Ack`] as soon as it is queued
//!   for processing;
//! - **complete**: `ANALYSIS_COMPLETE` notifications are broadcast later to
//!   whoever is listening. Having no listener is fine.

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Ack, AnalysisRequest, Message};

const REQUEST_CAPACITY: usize = 32;
const COMPLETION_CAPACITY: usize = 64;

/// A queued request with its reply channel.
#[derive(Debug)]
pub struct AnalyzeEnvelope {
    pub request: AnalysisRequest,
    pub reply: oneshot::Sender<Ack>,
}

/// Receiving end served by the orchestrator.
pub type RequestReceiver = mpsc::Receiver<AnalyzeEnvelope>;

/// Cloneable sender side shared by triggers and the panel.
#[derive(Debug, Clone)]
pub struct MessageBus {
    requests: mpsc::Sender<AnalyzeEnvelope>,
    completions: broadcast::Sender<Message>,
}

impl MessageBus {
    /// Create a bus and the receiver the orchestrator serves.
    pub fn new() -> (Self, RequestReceiver) {
        let (requests, rx) = mpsc::channel(REQUEST_CAPACITY);
        let (completions, _) = broadcast::channel(COMPLETION_CAPACITY);
        (
            Self {
                requests,
                completions,
            },
            rx,
        )
    }

    /// Submit text for analysis and wait for the acceptance ack.
    pub async fn analyze(&self, text: impl Into<String>) -> Result<Ack> {
        let (reply, ack) = oneshot::channel();
        self.requests
            .send(AnalyzeEnvelope {
                request: AnalysisRequest::new(text),
                reply,
            })
            .await
            .map_err(|_| Error::ChannelClosed)?;
        ack.await.map_err(|_| Error::ChannelClosed)
    }

    /// Route a wire message. Requests yield their ack; notifications yield `None`.
    pub async fn dispatch(&self, message: Message) -> Result<Option<Ack>> {
        match message {
            Message::AnalyzePost { text } => self.analyze(text).await.map(Some),
            complete @ Message::AnalysisComplete { .. } => {
                self.notify(complete);
                Ok(None)
            }
        }
    }

    /// Listen for completion notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.completions.subscribe()
    }

    /// Best-effort broadcast of a completion notification.
    pub fn notify(&self, message: Message) {
        if self.completions.send(message).is_err() {
            debug!("No completion listeners");
        }
    }

    /// Whether the orchestrator side is still being served.
    pub fn is_open(&self) -> bool {
        !self.requests.is_closed()
    }
}
