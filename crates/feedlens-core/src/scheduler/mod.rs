//! Scan scheduler.
//!
//! Watches a mutation stream and runs the scan callback at a bounded rate:
//! every element insertion restarts a [`SETTLE_WINDOW`] timer and the scan
//! runs once when the timer finally elapses. One unconditional scan runs
//! [`INITIAL_SCAN_DELAY`] after start to cover content present before
//! observation began.
//!
//! Dropping or stopping the scheduler aborts the task, cancelling any
//! pending settle timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, sleep, sleep_until};
use tracing::{debug, info};

use crate::dom::MutationRecord;

/// Quiet period required after the last insertion before a rescan.
pub const SETTLE_WINDOW: Duration = Duration::from_millis(750);

/// Delay before the unconditional first scan.
pub const INITIAL_SCAN_DELAY: Duration = Duration::from_millis(2000);

/// Why a scan ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanReason {
    Initial,
    Settled,
}

/// Handle to a running scheduler task.
pub struct ScanScheduler {
    abort_handle: tokio::task::AbortHandle,
    scans: Arc<AtomicU64>,
}

impl ScanScheduler {
    /// Spawn the scheduler on the current runtime.
    pub fn start<F>(mut mutations: mpsc::UnboundedReceiver<MutationRecord>, mut scan: F) -> Self
    where
        F: FnMut(ScanReason) + Send + 'static,
    {
        let scans = Arc::new(AtomicU64::new(0));
        let counter = scans.clone();

        let handle = tokio::spawn(async move {
            let initial = sleep(INITIAL_SCAN_DELAY);
            tokio::pin!(initial);
            let mut initial_done = false;
            let mut deadline: Option<Instant> = None;
            let mut closed = false;

            loop {
                if closed && deadline.is_none() && initial_done {
                    break;
                }
                tokio::select! {
                    _ = &mut initial, if !initial_done => {
                        initial_done = true;
                        counter.fetch_add(1, Ordering::Relaxed);
                        debug!("Running initial scan");
                        scan(ScanReason::Initial);
                    }
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        deadline = None;
                        counter.fetch_add(1, Ordering::Relaxed);
                        debug!("Settle window elapsed, rescanning");
                        scan(ScanReason::Settled);
                    }
                    record = mutations.recv(), if !closed => match record {
                        Some(record) if record.element_inserted => {
                            deadline = Some(Instant::now() + SETTLE_WINDOW);
                        }
                        Some(_) => {}
                        None => {
                            debug!("Mutation stream closed");
                            closed = true;
                        }
                    },
                }
            }
            info!(scans = counter.load(Ordering::Relaxed), "Scan scheduler finished");
        });

        Self {
            abort_handle: handle.abort_handle(),
            scans,
        }
    }

    /// Number of scans run so far.
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.abort_handle.is_finished()
    }

    /// Cancel the task and any pending settle timer.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

impl Drop for ScanScheduler {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}
