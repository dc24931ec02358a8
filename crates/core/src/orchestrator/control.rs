use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::types::{AcquireError, Phase, RunStatus};
use crate::admission::QueueAdmission;
use crate::connectivity::{
    sleep_or_cancel, BackoffController, Flow, PhaseReporter, PlaybackMonitor, Recovery,
};
use crate::metrics;
use crate::store::JobKind;

pub(crate) struct Shared {
    pub status: RunStatus,
    /// Present while a run is reserved or active.
    pub cancel: Option<CancellationToken>,
}

/// Shared, lock-protected run status.
#[derive(Clone)]
pub struct StatusHandle {
    inner: Arc<Mutex<Shared>>,
}

impl StatusHandle {
    pub(crate) fn new(job: JobKind) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Shared {
                status: RunStatus::idle(job),
                cancel: None,
            })),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Shared> {
        // A panicked run must not wedge status reads.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> RunStatus {
        self.lock().status.clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut RunStatus)) {
        f(&mut self.lock().status);
    }
}

impl PhaseReporter for StatusHandle {
    fn report_phase(&self, phase: Phase, detail: Option<String>) {
        let mut guard = self.lock();
        let shared = &mut *guard;
        let stopping = shared
            .cancel
            .as_ref()
            .is_some_and(|token| token.is_cancelled());
        // Once stop was requested the phase stays `stopping`.
        if stopping && shared.status.running {
            return;
        }
        shared.status.phase = phase;
        shared.status.detail = detail;
    }
}

/// Outcome of a collaborator call run through the backoff policy.
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    /// Permanent failure for this item.
    Failed(AcquireError),
    Cancelled,
}

impl<T> Attempt<T> {
    /// Fold into a result; cancellation becomes [`AcquireError::Cancelled`].
    pub fn into_result(self) -> Result<T, AcquireError> {
        match self {
            Attempt::Done(value) => Ok(value),
            Attempt::Failed(e) => Err(e),
            Attempt::Cancelled => Err(AcquireError::Cancelled),
        }
    }
}

/// Per-run handle for waits, phase changes and retries.
///
/// Every wait selects on the run's cancellation token.
pub struct RunControl {
    job: JobKind,
    cancel: CancellationToken,
    status: StatusHandle,
    backoff: BackoffController,
    playback: Arc<dyn PlaybackMonitor>,
}

impl RunControl {
    pub(crate) fn new(
        job: JobKind,
        cancel: CancellationToken,
        status: StatusHandle,
        backoff: BackoffController,
        playback: Arc<dyn PlaybackMonitor>,
    ) -> Self {
        Self {
            job,
            cancel,
            status,
            backoff,
            playback,
        }
    }

    pub fn job(&self) -> JobKind {
        self.job
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn set_phase(&self, phase: Phase) {
        self.status.report_phase(phase, None);
    }

    pub fn set_detail(&self, phase: Phase, detail: impl Into<String>) {
        self.status.report_phase(phase, Some(detail.into()));
    }

    pub fn is_playback_active(&self) -> bool {
        self.playback.is_playback_active()
    }

    pub async fn pause(&self, duration: Duration) -> Flow {
        sleep_or_cancel(duration, &self.cancel).await
    }

    pub async fn wait_until_online(&mut self, resume_phase: Phase) -> Flow {
        self.backoff
            .wait_until_online(resume_phase, &self.cancel, &self.status)
            .await
    }

    /// Slow down while the user is watching or reading.
    pub async fn throttle_for_playback(&self, throttle: Duration, resume_phase: Phase) -> Flow {
        if !self.playback.is_playback_active() {
            return if self.is_cancelled() {
                Flow::Stop
            } else {
                Flow::Continue
            };
        }

        debug!(job = %self.job, "Playback active, throttling for {:?}", throttle);
        metrics::WAITS
            .with_label_values(&[self.job.as_str(), "playback"])
            .inc();
        self.status.report_phase(
            Phase::WaitingPlayback,
            Some("Playback active, slowing down".to_string()),
        );
        let flow = self.pause(throttle).await;
        if flow == Flow::Continue {
            self.status.report_phase(resume_phase, None);
        }
        flow
    }

    pub async fn wait_for_slot(&self, admission: &QueueAdmission, resume_phase: Phase) -> Flow {
        admission
            .wait_for_slot(self.job.as_str(), resume_phase, &self.cancel, &self.status)
            .await
    }

    /// Run `call` until it succeeds, fails permanently or the run stops.
    ///
    /// Transient failures go through the backoff controller and are retried
    /// without limit.
    pub async fn retry<T, F, Fut>(&mut self, phase: Phase, mut call: F) -> Attempt<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, AcquireError>> + Send,
        T: Send,
    {
        loop {
            if self.cancel.is_cancelled() {
                return Attempt::Cancelled;
            }
            match call().await {
                Ok(value) => {
                    self.backoff.reset();
                    return Attempt::Done(value);
                }
                Err(AcquireError::Cancelled) => return Attempt::Cancelled,
                Err(e) => {
                    match self
                        .backoff
                        .recover(&e, phase, &self.cancel, &self.status)
                        .await
                    {
                        Recovery::Retry => continue,
                        Recovery::Permanent => return Attempt::Failed(e),
                        Recovery::Cancelled => return Attempt::Cancelled,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogError;
    use crate::connectivity::{BackoffPolicy, RuntimeFlags};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn control(flags: &RuntimeFlags) -> (RunControl, StatusHandle, CancellationToken) {
        let status = StatusHandle::new(JobKind::Anime);
        let cancel = CancellationToken::new();
        {
            let mut shared = status.lock();
            shared.status.running = true;
            shared.cancel = Some(cancel.clone());
        }
        let backoff = BackoffController::new(
            "anime",
            BackoffPolicy {
                threshold: 3,
                offline_poll_interval: Duration::from_millis(5),
                cooldown: Duration::from_millis(10),
            },
            Arc::new(flags.clone()),
        );
        let control = RunControl::new(
            JobKind::Anime,
            cancel.clone(),
            status.clone(),
            backoff,
            Arc::new(flags.clone()),
        );
        (control, status, cancel)
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let flags = RuntimeFlags::new();
        let (mut control, _, _) = control(&flags);
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result = control
            .retry(Phase::Fetching, move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 4 {
                    Err(AcquireError::Catalog(CatalogError::Unavailable(
                        "timeout".to_string(),
                    )))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert!(matches!(result, Attempt::Done(7)));
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_retry_permanent_failure() {
        let flags = RuntimeFlags::new();
        let (mut control, _, _) = control(&flags);

        let result: Attempt<()> = control
            .retry(Phase::Searching, || async {
                Err(AcquireError::Rejected("bad request".to_string()))
            })
            .await;

        match result {
            Attempt::Failed(e) => assert_eq!(e.to_string(), "bad request"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stopping_phase_is_sticky() {
        let flags = RuntimeFlags::new();
        let (control, status, cancel) = control(&flags);

        status.update(|s| s.phase = Phase::Stopping);
        cancel.cancel();
        control.set_phase(Phase::Searching);
        assert_eq!(status.snapshot().phase, Phase::Stopping);

        let result: Attempt<()> = {
            let mut control = control;
            control.retry(Phase::Searching, || async { Ok(()) }).await
        };
        assert!(matches!(result, Attempt::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_throttle() {
        let flags = RuntimeFlags::new();
        let (control, status, _) = control(&flags);

        let started = tokio::time::Instant::now();
        assert_eq!(
            control
                .throttle_for_playback(Duration::from_secs(5), Phase::Fetching)
                .await,
            Flow::Continue
        );
        assert!(started.elapsed() < Duration::from_secs(1));

        flags.set_playback_active(true);
        assert_eq!(
            control
                .throttle_for_playback(Duration::from_secs(5), Phase::Fetching)
                .await,
            Flow::Continue
        );
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(status.snapshot().phase, Phase::Fetching);
    }
}
