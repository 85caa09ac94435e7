//! Page scanner.
//!
//! One page context: a shared document, the extractor and injector working
//! on it, and the scan scheduler observing it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dom::{NodeId, SharedDocument};
use crate::error::{Error, Result};
use crate::extraction::{ExpandedText, Extractor};
use crate::injector::{ActionInjector, TriggerId};
use crate::messaging::MessageBus;
use crate::scheduler::{ScanReason, ScanScheduler};

/// Result of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Blocks extracted from unmarked posts.
    pub blocks: usize,
    /// Triggers created by this scan.
    pub injected: Vec<TriggerId>,
}

/// Scanner for one document.
pub struct PageScanner {
    document: SharedDocument,
    container: NodeId,
    extractor: Extractor,
    injector: ActionInjector,
    expanded_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<ExpandedText>>>,
}

impl PageScanner {
    /// Scan the whole document.
    pub fn new(document: SharedDocument, bus: MessageBus) -> Result<Self> {
        let container = document.lock().map_err(|_| Error::LockPoisoned)?.root();
        Ok(Self::with_container(document, container, bus))
    }

    /// Scan only the subtree under `container`.
    pub fn with_container(document: SharedDocument, container: NodeId, bus: MessageBus) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            extractor: Extractor::new(document.clone()).with_expansion_channel(tx),
            injector: ActionInjector::new(document.clone(), bus),
            document,
            container,
            expanded_rx: std::sync::Mutex::new(Some(rx)),
        }
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn injector(&self) -> &ActionInjector {
        &self.injector
    }

    /// Extract and inject once.
    pub fn scan(&self) -> Result<ScanReport> {
        let mut doc = self.document.lock().map_err(|_| Error::LockPoisoned)?;
        let blocks = self.extractor.extract(&mut doc, self.container);
        let injected = self.injector.inject(&mut doc, &blocks);
        debug!(blocks = blocks.len(), injected = injected.len(), "Scan finished");
        Ok(ScanReport {
            blocks: blocks.len(),
            injected,
        })
    }

    /// Observe the container and keep scanning until the scheduler is dropped.
    ///
    /// Also starts forwarding delayed re-extractions to the injector.
    pub fn start(self: &Arc<Self>) -> Result<ScanScheduler> {
        let mutations = self
            .document
            .lock()
            .map_err(|_| Error::LockPoisoned)?
            .subscribe(self.container);

        if let Some(mut expanded_rx) = self
            .expanded_rx
            .lock()
            .map_err(|_| Error::LockPoisoned)?
            .take()
        {
            let injector = self.injector.clone();
            tokio::spawn(async move {
                while let Some(expanded) = expanded_rx.recv().await {
                    if let Err(e) = injector.apply_expanded(&expanded) {
                        warn!(error = %e, "Failed to apply expanded text");
                    }
                }
            });
        }

        let scanner = Arc::clone(self);
        info!(container = self.container.index(), "Observing document");
        Ok(ScanScheduler::start(mutations, move |reason: ScanReason| {
            match scanner.scan() {
                Ok(report) if !report.injected.is_empty() => {
                    info!(reason = ?reason, injected = report.injected.len(), "Scan injected triggers");
                }
                Ok(_) => {}
                Err(e) => warn!(reason = ?reason, error = %e, "Scan failed"),
            }
        }))
    }
}
