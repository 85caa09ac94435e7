//! Analysis orchestrator.
//!
//! Accepts requests, acknowledges them immediately, and runs each one to
//! completion in its own task:
//! 1. Validate the text
//! 2. Resolve credentials from the state store
//! 3. Make exactly one generation call (no retry)
//! 4. Write the outcome over the analysis slot
//! 5. Broadcast a completion notification
//!
//! Every accepted request carries a fresh request id. The id is returned in
//! the ack and stored with the outcome so a reader can tell which request
//! the slot currently describes.

pub mod prompt;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client::{GenerationClient, GenerationRequest};
use crate::error::{Error, Result};
use crate::messaging::{MessageBus, RequestReceiver};
use crate::store::StateStore;
use crate::types::{Ack, AnalysisRequest, AnalysisResult, Message};

/// Runs analysis requests against the generation service.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<StateStore>,
    client: Arc<dyn GenerationClient>,
    bus: MessageBus,
}

impl Orchestrator {
    pub fn new(store: Arc<StateStore>, client: Arc<dyn GenerationClient>, bus: MessageBus) -> Self {
        Self { store, client, bus }
    }

    /// Serve requests from the bus until every sender is gone.
    pub fn serve(self, mut requests: RequestReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(envelope) = requests.recv().await {
                let ack = self.handle(envelope.request);
                if envelope.reply.send(ack).is_err() {
                    warn!("Requester went away before the ack");
                }
            }
            info!("Request channel closed, orchestrator stopping");
        })
    }

    /// Accept a request: claim the slot, start processing, return the ack.
    pub fn handle(&self, request: AnalysisRequest) -> Ack {
        let request_id = Uuid::new_v4().to_string();
        info!(
            request_id = %request_id,
            chars = request.source_text.chars().count(),
            "Accepted analysis request"
        );

        if let Err(e) = self.store.mark_pending(&request_id, &request.source_text) {
            warn!(request_id = %request_id, error = %e, "Failed to mark request pending");
        }

        let this = self.clone();
        let id = request_id.clone();
        tokio::spawn(async move {
            this.process(id, request).await;
        });

        Ack::received(request_id)
    }

    /// Run one request to completion and publish its outcome.
    pub async fn process(&self, request_id: String, request: AnalysisRequest) -> AnalysisResult {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let result = match self.analyze(&request).await {
            Ok(insights_text) => {
                info!(request_id = %request_id, "Generated insights");
                AnalysisResult::Success {
                    request_id,
                    source_text: request.source_text,
                    insights_text,
                    timestamp,
                }
            }
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Analysis failed");
                AnalysisResult::Failure {
                    request_id,
                    source_text: request.source_text,
                    error_message: e.to_string(),
                    timestamp,
                }
            }
        };

        if let Err(e) = self.store.write_outcome(&result) {
            error!(request_id = %result.request_id(), error = %e, "Failed to store outcome");
        }

        self.bus.notify(Message::AnalysisComplete {
            success: result.is_success(),
            error: result.error_message().map(String::from),
            request_id: Some(result.request_id().to_string()),
        });

        result
    }

    /// Validate, resolve credentials and call the service once.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String> {
        if request.source_text.trim().is_empty() {
            return Err(Error::EmptyInput);
        }

        let credentials = self.store.credentials()?;
        let api_key = credentials.api_key().ok_or(Error::MissingCredentials)?;

        self.client
            .generate(GenerationRequest {
                api_key: api_key.to_string(),
                model: credentials.model().to_string(),
                system_prompt: prompt::system_prompt(),
                user_text: request.source_text.clone(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatCompletionResponse;
    use crate::error::{EMPTY_INPUT_MESSAGE, MALFORMED_RESPONSE_MESSAGE, MISSING_CREDENTIALS_MESSAGE};
    use crate::types::DEFAULT_MODEL;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Reply {
        Text(&'static str),
        Status(u16, &'static str),
        /// Raw chat-completions body, decoded the way the HTTP client does.
        Body(&'static str),
    }

    struct FakeClient {
        reply: Reply,
        calls: AtomicUsize,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl FakeClient {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerationClient for FakeClient {
        async fn generate(&self, request: GenerationRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::Status(status, detail) => Err(Error::transport(Some(*status), *detail)),
                Reply::Body(body) => {
                    let data: ChatCompletionResponse =
                        serde_json::from_str(body).map_err(|_| Error::MalformedResponse)?;
                    data.content().map(String::from).ok_or(Error::MalformedResponse)
                }
            }
        }
    }

    fn setup(reply: Reply, api_key: Option<&str>) -> (Orchestrator, Arc<FakeClient>, Arc<StateStore>, MessageBus) {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        if let Some(key) = api_key {
            store.set_api_key(key).unwrap();
        }
        let client = FakeClient::new(reply);
        let (bus, _rx) = MessageBus::new();
        let orchestrator = Orchestrator::new(store.clone(), client.clone(), bus.clone());
        (orchestrator, client, store, bus)
    }

    #[tokio::test]
    async fn test_missing_credentials_makes_no_call() {
        let (orchestrator, client, store, bus) = setup(Reply::Text("- a"), None);
        let mut completions = bus.subscribe();

        let result = orchestrator
            .process("r-1".into(), AnalysisRequest::new("A post worth reading"))
            .await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.error_message(), Some(MISSING_CREDENTIALS_MESSAGE));
        let slot = store.read_slot().unwrap();
        assert_eq!(slot.error.as_deref(), Some(MISSING_CREDENTIALS_MESSAGE));
        assert_eq!(slot.source_text.as_deref(), Some("A post worth reading"));

        match completions.recv().await.unwrap() {
            Message::AnalysisComplete { success, request_id, .. } => {
                assert!(!success);
                assert_eq!(request_id.as_deref(), Some("r-1"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_input_fails_without_call() {
        let (orchestrator, client, store, _bus) = setup(Reply::Text("- a"), Some("sk-test"));
        orchestrator.process("r-1".into(), AnalysisRequest::new("   ")).await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.read_slot().unwrap().error.as_deref(), Some(EMPTY_INPUT_MESSAGE));
    }

    #[tokio::test]
    async fn test_transport_failure_carries_detail() {
        let (orchestrator, client, store, _bus) =
            setup(Reply::Status(401, "Invalid API key provided"), Some("sk-bad"));
        let result = orchestrator
            .process("r-1".into(), AnalysisRequest::new("Some post"))
            .await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            result.error_message(),
            Some("API failed: 401. Invalid API key provided")
        );
        let slot = store.read_slot().unwrap();
        assert!(slot.insights_text.is_none());
        assert!(slot.error.unwrap().contains("Invalid API key provided"));
    }

    #[tokio::test]
    async fn test_missing_message_content_is_malformed() {
        let (orchestrator, client, store, bus) =
            setup(Reply::Body(r#"{"choices":[{"message":{"role":"assistant"}}]}"#), Some("sk-test"));
        let mut completions = bus.subscribe();
        let result = orchestrator
            .process("r-3".into(), AnalysisRequest::new("Some post"))
            .await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.error_message(), Some(MALFORMED_RESPONSE_MESSAGE));
        let slot = store.read_slot().unwrap();
        assert_eq!(slot.request_id.as_deref(), Some("r-3"));
        assert!(slot.insights_text.is_none());
        assert_eq!(slot.error.as_deref(), Some(MALFORMED_RESPONSE_MESSAGE));
        match completions.recv().await.unwrap() {
            Message::AnalysisComplete { success, request_id, .. } => {
                assert!(!success);
                assert_eq!(request_id.as_deref(), Some("r-3"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_success_writes_slot_and_uses_credentials() {
        let (orchestrator, client, store, _bus) = setup(Reply::Text("1. Key takeaway: ship it"), Some("sk-test"));
        let result = orchestrator
            .process("r-7".into(), AnalysisRequest::new("Some post"))
            .await;

        assert!(result.is_success());
        let slot = store.read_slot().unwrap();
        assert_eq!(slot.request_id.as_deref(), Some("r-7"));
        assert_eq!(slot.insights_text.as_deref(), Some("1. Key takeaway: ship it"));
        assert!(slot.error.is_none());
        assert!(slot.timestamp.is_some());

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].api_key, "sk-test");
        assert_eq!(seen[0].model, DEFAULT_MODEL);
        assert_eq!(seen[0].user_text, "Some post");
    }

    #[tokio::test]
    async fn test_handle_acks_before_processing() {
        let (orchestrator, client, store, bus) = setup(Reply::Text("- a"), Some("sk-test"));
        let mut completions = bus.subscribe();

        let ack = orchestrator.handle(AnalysisRequest::new("Some post"));
        // Nothing has run yet on the current-thread runtime.
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        let slot = store.read_slot().unwrap();
        assert!(slot.is_pending());
        assert_eq!(slot.request_id.as_deref(), Some(ack.request_id.as_str()));

        match completions.recv().await.unwrap() {
            Message::AnalysisComplete { success, request_id, .. } => {
                assert!(success);
                assert_eq!(request_id, Some(ack.request_id.clone()));
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_serve_answers_bus_requests() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        store.set_api_key("sk-test").unwrap();
        let client = FakeClient::new(Reply::Text("- a"));
        let (bus, rx) = MessageBus::new();
        let mut completions = bus.subscribe();
        let _server = Orchestrator::new(store.clone(), client.clone(), bus.clone()).serve(rx);

        let first = bus.analyze("first post").await.unwrap();
        let second = bus.analyze("second post").await.unwrap();
        assert_ne!(first.request_id, second.request_id);

        for _ in 0..2 {
            completions.recv().await.unwrap();
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        let slot = store.read_slot().unwrap();
        assert!(slot.insights_text.is_some());
        assert!(slot.request_id == Some(first.request_id) || slot.request_id == Some(second.request_id));
    }
}
