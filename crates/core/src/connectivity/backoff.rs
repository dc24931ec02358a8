use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::classify::is_transient;
use super::flags::ConnectivityMonitor;
use crate::metrics;
use crate::orchestrator::Phase;

/// Receives phase changes while the controller waits.
pub trait PhaseReporter: Send + Sync {
    fn report_phase(&self, phase: Phase, detail: Option<String>);
}

/// Whether the caller should keep going after a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Decision for a failed collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Retry the same call.
    Retry,
    /// Not network related; record a per-item failure.
    Permanent,
    /// Cancellation was observed while waiting.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Consecutive transient errors tolerated before cooling down.
    pub threshold: u32,
    pub offline_poll_interval: Duration,
    pub cooldown: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            threshold: 3,
            offline_poll_interval: Duration::from_secs(5),
            cooldown: Duration::from_secs(10),
        }
    }
}

/// Sleep for `duration` unless `cancel` fires first.
pub(crate) async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Flow {
    if duration.is_zero() {
        return if cancel.is_cancelled() {
            Flow::Stop
        } else {
            Flow::Continue
        };
    }
    tokio::select! {
        _ = cancel.cancelled() => Flow::Stop,
        _ = tokio::time::sleep(duration) => Flow::Continue,
    }
}

/// Per-run transient error policy.
///
/// Offline: wait until connectivity returns. Online but failing: retry
/// immediately up to the threshold, then cool down once and start over.
pub struct BackoffController {
    policy: BackoffPolicy,
    connectivity: Arc<dyn ConnectivityMonitor>,
    consecutive: u32,
    job: &'static str,
}

impl BackoffController {
    pub fn new(
        job: &'static str,
        policy: BackoffPolicy,
        connectivity: Arc<dyn ConnectivityMonitor>,
    ) -> Self {
        Self {
            policy,
            connectivity,
            consecutive: 0,
            job,
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive
    }

    /// Forget previous failures after a successful call.
    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn is_offline(&self) -> bool {
        self.connectivity.is_offline()
    }

    /// Decide what to do with `err` raised while in `resume_phase`.
    pub async fn recover(
        &mut self,
        err: &(dyn Error + Send + Sync + 'static),
        resume_phase: Phase,
        cancel: &CancellationToken,
        reporter: &dyn PhaseReporter,
    ) -> Recovery {
        if !is_transient(err) {
            self.consecutive = 0;
            return Recovery::Permanent;
        }

        metrics::TRANSIENT_ERRORS
            .with_label_values(&[self.job])
            .inc();

        if self.connectivity.is_offline() {
            self.consecutive = 0;
            return match self.wait_until_online(resume_phase, cancel, reporter).await {
                Flow::Continue => Recovery::Retry,
                Flow::Stop => Recovery::Cancelled,
            };
        }

        self.consecutive += 1;
        if self.consecutive < self.policy.threshold {
            debug!(
                job = self.job,
                attempt = self.consecutive,
                "Transient error, retrying: {}",
                err
            );
            return Recovery::Retry;
        }

        self.consecutive = 0;
        warn!(
            job = self.job,
            "{} consecutive transient errors, cooling down for {:?}: {}",
            self.policy.threshold,
            self.policy.cooldown,
            err
        );
        metrics::WAITS.with_label_values(&[self.job, "cooldown"]).inc();
        reporter.report_phase(
            Phase::WaitingOffline,
            Some(format!("Connection issue: {}", err)),
        );

        if sleep_or_cancel(self.policy.cooldown, cancel).await == Flow::Stop {
            return Recovery::Cancelled;
        }
        reporter.report_phase(resume_phase, None);
        Recovery::Retry
    }

    /// Block while the connectivity flag reports offline.
    ///
    /// Returns immediately when online. Restores `resume_phase` after waiting.
    pub async fn wait_until_online(
        &mut self,
        resume_phase: Phase,
        cancel: &CancellationToken,
        reporter: &dyn PhaseReporter,
    ) -> Flow {
        if !self.connectivity.is_offline() {
            return if cancel.is_cancelled() {
                Flow::Stop
            } else {
                Flow::Continue
            };
        }

        info!(job = self.job, "Offline, waiting for connectivity");
        metrics::WAITS.with_label_values(&[self.job, "offline"]).inc();
        reporter.report_phase(
            Phase::WaitingOffline,
            Some("Waiting for connectivity".to_string()),
        );

        loop {
            if sleep_or_cancel(self.policy.offline_poll_interval, cancel).await == Flow::Stop {
                return Flow::Stop;
            }
            if !self.connectivity.is_offline() {
                break;
            }
        }

        info!(job = self.job, "Connectivity restored");
        self.consecutive = 0;
        reporter.report_phase(resume_phase, None);
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::RuntimeFlags;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingReporter {
        phases: Mutex<Vec<Phase>>,
    }

    impl PhaseReporter for RecordingReporter {
        fn report_phase(&self, phase: Phase, _detail: Option<String>) {
            self.phases.lock().unwrap().push(phase);
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct TestError(&'static str);

    fn controller(flags: &RuntimeFlags) -> BackoffController {
        BackoffController::new(
            "test",
            BackoffPolicy {
                threshold: 3,
                offline_poll_interval: Duration::from_millis(5),
                cooldown: Duration::from_secs(10),
            },
            Arc::new(flags.clone()),
        )
    }

    #[tokio::test]
    async fn test_permanent_error_resets_counter() {
        let flags = RuntimeFlags::new();
        let mut backoff = controller(&flags);
        let reporter = RecordingReporter::default();
        let cancel = CancellationToken::new();

        let timeout = TestError("request timeout");
        assert_eq!(
            backoff.recover(&timeout, Phase::Searching, &cancel, &reporter).await,
            Recovery::Retry
        );
        assert_eq!(backoff.consecutive_errors(), 1);

        let missing = TestError("media not found");
        assert_eq!(
            backoff.recover(&missing, Phase::Searching, &cancel, &reporter).await,
            Recovery::Permanent
        );
        assert_eq!(backoff.consecutive_errors(), 0);
        assert!(reporter.phases.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_after_threshold() {
        let flags = RuntimeFlags::new();
        let mut backoff = controller(&flags);
        let reporter = RecordingReporter::default();
        let cancel = CancellationToken::new();
        let err = TestError("connection refused");

        assert_eq!(
            backoff.recover(&err, Phase::Fetching, &cancel, &reporter).await,
            Recovery::Retry
        );
        assert_eq!(
            backoff.recover(&err, Phase::Fetching, &cancel, &reporter).await,
            Recovery::Retry
        );
        assert!(reporter.phases.lock().unwrap().is_empty());

        let started = tokio::time::Instant::now();
        assert_eq!(
            backoff.recover(&err, Phase::Fetching, &cancel, &reporter).await,
            Recovery::Retry
        );
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(backoff.consecutive_errors(), 0);
        assert_eq!(
            *reporter.phases.lock().unwrap(),
            vec![Phase::WaitingOffline, Phase::Fetching]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_is_cancellable() {
        let flags = RuntimeFlags::new();
        let mut backoff = controller(&flags);
        let reporter = RecordingReporter::default();
        let cancel = CancellationToken::new();
        let err = TestError("timeout");

        for _ in 0..2 {
            backoff.recover(&err, Phase::Fetching, &cancel, &reporter).await;
        }

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        assert_eq!(
            backoff.recover(&err, Phase::Fetching, &cancel, &reporter).await,
            Recovery::Cancelled
        );
    }

    #[tokio::test]
    async fn test_offline_waits_until_online() {
        let flags = RuntimeFlags::new();
        flags.set_offline(true);
        let mut backoff = controller(&flags);
        let reporter = RecordingReporter::default();
        let cancel = CancellationToken::new();

        let toggle = flags.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            toggle.set_offline(false);
        });

        let err = TestError("client is offline");
        assert_eq!(
            backoff.recover(&err, Phase::Searching, &cancel, &reporter).await,
            Recovery::Retry
        );
        assert_eq!(
            *reporter.phases.lock().unwrap(),
            vec![Phase::WaitingOffline, Phase::Searching]
        );
    }

    #[tokio::test]
    async fn test_wait_until_online_stops_on_cancel() {
        let flags = RuntimeFlags::new();
        flags.set_offline(true);
        let mut backoff = controller(&flags);
        let reporter = RecordingReporter::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(
            backoff.wait_until_online(Phase::Fetching, &cancel, &reporter).await,
            Flow::Stop
        );
    }

    #[tokio::test]
    async fn test_wait_until_online_is_noop_when_online() {
        let flags = RuntimeFlags::new();
        let mut backoff = controller(&flags);
        let reporter = RecordingReporter::default();
        let cancel = CancellationToken::new();

        assert_eq!(
            backoff.wait_until_online(Phase::Fetching, &cancel, &reporter).await,
            Flow::Continue
        );
        assert!(reporter.phases.lock().unwrap().is_empty());
    }
}
