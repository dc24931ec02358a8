//! Backpressure on the shared chapter queue.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connectivity::{sleep_or_cancel, Flow, PhaseReporter};
use crate::metrics;
use crate::orchestrator::Phase;
use crate::store::{ChapterQueueStore, SqliteStore, StoreError};

/// Source of the number of distinct items waiting downstream.
pub trait QueueDepth: Send + Sync {
    fn distinct_queued_units(&self) -> Result<u64, StoreError>;
}

impl QueueDepth for SqliteStore {
    fn distinct_queued_units(&self) -> Result<u64, StoreError> {
        self.count_distinct_queued_media()
    }
}

/// Holds new items back while the downstream queue is at capacity.
pub struct QueueAdmission {
    source: Arc<dyn QueueDepth>,
    cap: u64,
    poll_interval: Duration,
}

impl QueueAdmission {
    pub fn new(source: Arc<dyn QueueDepth>, cap: u64, poll_interval: Duration) -> Self {
        Self {
            source,
            cap,
            poll_interval,
        }
    }

    pub fn cap(&self) -> u64 {
        self.cap
    }

    /// Wait until the queue is below the cap.
    ///
    /// A failing count admits the item; the worker is better off busy than
    /// the run stalled on a storage error.
    pub async fn wait_for_slot(
        &self,
        job: &'static str,
        resume_phase: Phase,
        cancel: &CancellationToken,
        reporter: &dyn PhaseReporter,
    ) -> Flow {
        let mut waited = false;
        loop {
            if cancel.is_cancelled() {
                return Flow::Stop;
            }

            match self.source.distinct_queued_units() {
                Ok(count) if count >= self.cap => {
                    if !waited {
                        info!(job = job, count = count, cap = self.cap, "Queue full, waiting");
                        metrics::WAITS.with_label_values(&[job, "queue"]).inc();
                        waited = true;
                    }
                    reporter.report_phase(
                        Phase::WaitingQueue,
                        Some(format!(
                            "Queue full ({}/{} queued), waiting for downloads",
                            count, self.cap
                        )),
                    );
                    if sleep_or_cancel(self.poll_interval, cancel).await == Flow::Stop {
                        return Flow::Stop;
                    }
                }
                Ok(_) => break,
                Err(e) => {
                    warn!(job = job, "Failed to count queued items, admitting: {}", e);
                    break;
                }
            }
        }

        if waited {
            reporter.report_phase(resume_phase, None);
        }
        Flow::Continue
    }
}
