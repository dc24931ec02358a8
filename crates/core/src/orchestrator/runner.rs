//! Generic batch run loop.
//!
//! One background task per active run walks the work list sequentially:
//! skip check, metadata fetch, provider search, selection, enqueue,
//! checkpoint, pause. Every wait observes the run's cancellation token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::control::{Attempt, RunControl, StatusHandle};
use super::strategy::AcquisitionStrategy;
use super::types::{
    AcquireError, InputPreview, ItemResult, OrchestratorError, Phase, RunParameters, RunStatus,
    Signals, StartRequest, WorkItem,
};
use crate::connectivity::{BackoffController, BackoffPolicy, Flow};
use crate::metrics;
use crate::notify::Notifier;
use crate::store::{
    Checkpoint, CheckpointStore, ItemOutcome, JobKind, OutcomeLists, RunCounters,
};

const PREVIEW_SAMPLE: usize = 5;

/// Control surface of one job kind, independent of its strategy.
#[async_trait]
pub trait JobControl: Send + Sync {
    fn job(&self) -> JobKind;

    async fn start(&self, request: StartRequest) -> Result<(), OrchestratorError>;

    fn stop(&self) -> Result<(), OrchestratorError>;

    fn reset(&self) -> Result<(), OrchestratorError>;

    fn status(&self) -> RunStatus;

    async fn preview_input(&self, source: &str) -> Result<InputPreview, OrchestratorError>;

    /// Request a stop and wait for the run to leave its checkpoint.
    ///
    /// Returns `false` if the run was still active after `timeout`.
    async fn stop_and_wait(&self, timeout: Duration) -> bool {
        if self.stop().is_err() {
            return true;
        }
        let deadline = tokio::time::Instant::now() + timeout;
        while self.status().running {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }
}

/// Single-run-per-kind batch orchestrator.
pub struct Orchestrator<S: AcquisitionStrategy> {
    strategy: Arc<S>,
    store: Arc<dyn CheckpointStore>,
    signals: Signals,
    notifier: Notifier,
    backoff: BackoffPolicy,
    status: StatusHandle,
}

struct RunPlan {
    items: Vec<WorkItem>,
    params: RunParameters,
    source: String,
    start_index: usize,
    outcomes: OutcomeLists,
    counters: RunCounters,
    resumed: bool,
}

impl<S: AcquisitionStrategy> Orchestrator<S> {
    pub fn new(
        strategy: S,
        store: Arc<dyn CheckpointStore>,
        signals: Signals,
        notifier: Notifier,
        backoff: BackoffPolicy,
    ) -> Self {
        let job = strategy.job();
        Self {
            strategy: Arc::new(strategy),
            store,
            signals,
            notifier,
            backoff,
            status: StatusHandle::new(job),
        }
    }

    pub fn job(&self) -> JobKind {
        self.strategy.job()
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Validate the request and launch the run in the background.
    pub async fn start(&self, request: StartRequest) -> Result<(), OrchestratorError> {
        let job = self.job();

        // Reserve the slot before any await so a concurrent start fails fast.
        let cancel = {
            let mut shared = self.status.lock();
            if shared.status.running {
                return Err(OrchestratorError::AlreadyRunning(job));
            }
            let token = CancellationToken::new();
            shared.status.running = true;
            shared.cancel = Some(token.clone());
            token
        };

        match self.prepare(request).await {
            Ok(plan) => {
                self.launch(plan, cancel);
                Ok(())
            }
            Err(e) => {
                let mut shared = self.status.lock();
                shared.status.running = false;
                shared.cancel = None;
                Err(e)
            }
        }
    }

    /// Ask the active run to stop at its next boundary.
    pub fn stop(&self) -> Result<(), OrchestratorError> {
        let job = self.job();
        let mut guard = self.status.lock();
        let shared = &mut *guard;
        if !shared.status.running {
            return Err(OrchestratorError::NotRunning(job));
        }

        match &shared.cancel {
            Some(token) if !token.is_cancelled() => {
                info!(job = %job, "Stop requested");
                token.cancel();
                shared.status.phase = Phase::Stopping;
                shared.status.detail = None;
            }
            _ => debug!(job = %job, "Stop already requested"),
        }
        Ok(())
    }

    /// Drop the checkpoint and clear the status.
    pub fn reset(&self) -> Result<(), OrchestratorError> {
        let job = self.job();
        let mut shared = self.status.lock();
        if shared.status.running {
            return Err(OrchestratorError::CannotResetWhileRunning(job));
        }
        if let Err(e) = self.store.delete_checkpoint(job) {
            warn!(job = %job, "Failed to delete checkpoint: {}", e);
        }
        shared.status = RunStatus::idle(job);
        info!(job = %job, "Run state reset");
        Ok(())
    }

    /// Status snapshot; when idle, a resumable checkpoint is overlaid.
    pub fn status(&self) -> RunStatus {
        let mut snapshot = self.status.snapshot();
        if snapshot.running {
            return snapshot;
        }

        match self.store.load_checkpoint(snapshot.job) {
            Ok(Some(checkpoint)) if checkpoint.active => {
                snapshot.can_resume = true;
                snapshot.current_index = checkpoint.current_index;
                snapshot.total_count = checkpoint.total_count;
                snapshot.source = Some(checkpoint.source);
                snapshot.provider = Some(checkpoint.provider);
                snapshot.outcomes = checkpoint.outcomes;
                snapshot.counters = checkpoint.counters;
            }
            Ok(_) => {}
            Err(e) => warn!(job = %snapshot.job, "Failed to load checkpoint: {}", e),
        }
        snapshot
    }

    pub async fn preview_input(&self, source: &str) -> Result<InputPreview, OrchestratorError> {
        let items = self.load_items(source).await?;
        Ok(InputPreview {
            total_count: items.len(),
            sample: items.iter().take(PREVIEW_SAMPLE).map(WorkItem::label).collect(),
        })
    }

    async fn load_items(&self, source: &str) -> Result<Vec<WorkItem>, OrchestratorError> {
        let raw = tokio::fs::read(source)
            .await
            .map_err(|e| OrchestratorError::InvalidInput(format!("cannot read {}: {}", source, e)))?;
        self.strategy
            .parse_input(&raw)
            .map_err(|e| OrchestratorError::InvalidInput(format!("{}: {}", source, e)))
    }

    async fn prepare(&self, request: StartRequest) -> Result<RunPlan, OrchestratorError> {
        let job = self.job();

        let (source, params, restored) = if request.resume {
            let checkpoint = self
                .store
                .load_checkpoint(job)?
                .filter(|c| c.active)
                .ok_or(OrchestratorError::NoResumableState(job))?;
            let params = RunParameters {
                provider: checkpoint.provider.clone(),
                destination: checkpoint.destination.clone(),
            };
            (checkpoint.source.clone(), params, Some(checkpoint))
        } else {
            let source = non_blank(request.source)
                .ok_or_else(|| OrchestratorError::InvalidInput("source is required".to_string()))?;
            let provider = non_blank(request.provider).ok_or_else(|| {
                OrchestratorError::InvalidInput("provider is required".to_string())
            })?;
            let params = RunParameters {
                provider,
                destination: non_blank(request.destination),
            };
            (source, params, None)
        };

        self.strategy
            .validate(&params)
            .map_err(OrchestratorError::InvalidInput)?;
        let items = self.load_items(&source).await?;

        let plan = match restored {
            Some(checkpoint) => {
                if checkpoint.total_count != items.len() {
                    warn!(
                        job = %job,
                        "Input changed since checkpoint ({} items, was {})",
                        items.len(),
                        checkpoint.total_count
                    );
                }
                RunPlan {
                    start_index: checkpoint.current_index.min(items.len()),
                    outcomes: checkpoint.outcomes,
                    counters: checkpoint.counters,
                    resumed: true,
                    items,
                    params,
                    source,
                }
            }
            None => RunPlan {
                start_index: 0,
                outcomes: OutcomeLists::default(),
                counters: RunCounters::default(),
                resumed: false,
                items,
                params,
                source,
            },
        };
        Ok(plan)
    }

    fn launch(&self, plan: RunPlan, cancel: CancellationToken) {
        let job = self.job();
        let run_id = Uuid::new_v4();
        let total = plan.items.len();

        {
            let mut shared = self.status.lock();
            shared.status = RunStatus {
                job,
                running: true,
                can_resume: false,
                current_index: plan.start_index,
                total_count: total,
                current_title: None,
                phase: if cancel.is_cancelled() {
                    Phase::Stopping
                } else {
                    Phase::Fetching
                },
                detail: None,
                source: Some(plan.source.clone()),
                provider: Some(plan.params.provider.clone()),
                outcomes: plan.outcomes,
                counters: plan.counters,
                run_id: Some(run_id),
                started_at: Some(Utc::now()),
            };
        }

        if plan.resumed {
            info!(job = %job, index = plan.start_index, total = total, "Resuming run");
            self.notifier.info(format!(
                "Resuming {} batch from {}/{}",
                job, plan.start_index, total
            ));
        } else {
            info!(job = %job, total = total, source = %plan.source, "Starting run");
            self.notifier
                .info(format!("Starting {} batch for {} items", job, total));
        }
        metrics::RUNS.with_label_values(&[job.as_str(), "started"]).inc();

        let control = RunControl::new(
            job,
            cancel,
            self.status.clone(),
            BackoffController::new(
                job.as_str(),
                self.backoff.clone(),
                Arc::clone(&self.signals.connectivity),
            ),
            Arc::clone(&self.signals.playback),
        );

        let run = RunLoop {
            strategy: Arc::clone(&self.strategy),
            store: Arc::clone(&self.store),
            notifier: self.notifier.clone(),
            status: self.status.clone(),
            control,
            items: plan.items,
            params: plan.params,
            source: plan.source,
            index: plan.start_index,
        };

        tokio::spawn(
            run.run()
                .instrument(info_span!("batch_run", job = %job, run_id = %run_id)),
        );
    }
}

#[async_trait]
impl<S: AcquisitionStrategy> JobControl for Orchestrator<S> {
    fn job(&self) -> JobKind {
        Orchestrator::job(self)
    }

    async fn start(&self, request: StartRequest) -> Result<(), OrchestratorError> {
        Orchestrator::start(self, request).await
    }

    fn stop(&self) -> Result<(), OrchestratorError> {
        Orchestrator::stop(self)
    }

    fn reset(&self) -> Result<(), OrchestratorError> {
        Orchestrator::reset(self)
    }

    fn status(&self) -> RunStatus {
        Orchestrator::status(self)
    }

    async fn preview_input(&self, source: &str) -> Result<InputPreview, OrchestratorError> {
        Orchestrator::preview_input(self, source).await
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// State owned by the background task of one run.
struct RunLoop<S: AcquisitionStrategy> {
    strategy: Arc<S>,
    store: Arc<dyn CheckpointStore>,
    notifier: Notifier,
    status: StatusHandle,
    control: RunControl,
    items: Vec<WorkItem>,
    params: RunParameters,
    source: String,
    /// Next item to process.
    index: usize,
}

impl<S: AcquisitionStrategy> RunLoop<S> {
    async fn run(mut self) {
        let total = self.items.len();

        let completed = loop {
            if self.index >= total {
                break true;
            }
            let item = self.items[self.index].clone();
            let Some(result) = self.process(&item).await else {
                break false;
            };

            let delay = self.record(result);
            self.index += 1;
            let index = self.index;
            self.status.update(|s| s.current_index = index);
            self.save_checkpoint();

            if self.index < total {
                self.control.set_phase(Phase::Waiting);
                if self.control.pause(delay).await == Flow::Stop {
                    break false;
                }
            }
        };

        if completed {
            self.finish();
        } else {
            self.halt();
        }
    }

    /// Process one item. `None` means the run must stop before finishing it.
    async fn process(&mut self, item: &WorkItem) -> Option<ItemResult> {
        let strategy = Arc::clone(&self.strategy);
        let pacing = strategy.pacing().clone();

        if self.control.is_cancelled() {
            return None;
        }
        if self.control.wait_until_online(Phase::Fetching).await == Flow::Stop {
            return None;
        }
        if let Some(throttle) = pacing.playback_throttle {
            if self
                .control
                .throttle_for_playback(throttle, Phase::Fetching)
                .await
                == Flow::Stop
            {
                return None;
            }
        }
        if let Some(admission) = strategy.admission() {
            if self.control.wait_for_slot(admission, Phase::Fetching).await == Flow::Stop {
                return None;
            }
        }
        if self.control.is_cancelled() {
            return None;
        }

        // Persist before any side effect so a crash resumes at this item.
        self.save_checkpoint();
        let label = item.label();
        self.status
            .update(|s| s.current_title = Some(label.clone()));
        self.control.set_phase(Phase::Fetching);

        let params = &self.params;
        if let Some(reason) = strategy.skip_reason(item, params).await {
            return Some(ItemResult::Skipped(outcome(item.media_id, label, reason)));
        }

        let metadata = match self
            .control
            .retry(Phase::Fetching, || strategy.fetch_metadata(item))
            .await
        {
            Attempt::Done(Some(metadata)) => metadata,
            Attempt::Done(None) => {
                return Some(ItemResult::Failed(outcome(
                    item.media_id,
                    label,
                    "Not found in catalog",
                )))
            }
            Attempt::Failed(e) => {
                return Some(ItemResult::Failed(outcome(item.media_id, label, e.to_string())))
            }
            Attempt::Cancelled => return None,
        };

        let (media_id, title) = strategy.describe(&metadata);
        self.status
            .update(|s| s.current_title = Some(title.clone()));

        if let Some(reason) = strategy.skip_after_fetch(&metadata, params).await {
            return Some(ItemResult::Skipped(outcome(Some(media_id), title, reason)));
        }

        if self.control.pause(pacing.pre_search_delay).await == Flow::Stop {
            return None;
        }
        if let Some(throttle) = pacing.playback_search_throttle {
            if self
                .control
                .throttle_for_playback(throttle, Phase::Searching)
                .await
                == Flow::Stop
            {
                return None;
            }
        }
        self.control.set_phase(Phase::Searching);

        let candidates = match self
            .control
            .retry(Phase::Searching, || {
                strategy.search_candidates(&metadata, params)
            })
            .await
        {
            Attempt::Done(candidates) => candidates,
            Attempt::Failed(e) => {
                return Some(ItemResult::Failed(outcome(Some(media_id), title, e.to_string())))
            }
            Attempt::Cancelled => return None,
        };

        let selection = match strategy.select(&metadata, candidates) {
            Ok(selection) => selection,
            Err(reason) => {
                return Some(ItemResult::Failed(outcome(Some(media_id), title, reason)))
            }
        };

        let destination = strategy.resolve_destination(&metadata, params).await;
        if self.control.is_cancelled() {
            return None;
        }
        self.control.set_phase(strategy.enqueue_phase());

        match strategy
            .enqueue(item, &metadata, selection, &destination, params, &mut self.control)
            .await
        {
            Ok(processed) => Some(ItemResult::Processed(processed)),
            Err(AcquireError::Cancelled) => None,
            Err(e) => Some(ItemResult::Failed(outcome(Some(media_id), title, e.to_string()))),
        }
    }

    /// Append the result to the outcome lists; returns the pause to apply.
    fn record(&self, result: ItemResult) -> Duration {
        let job = self.strategy.job();
        let pacing = self.strategy.pacing();

        match result {
            ItemResult::Processed(item) => {
                info!(
                    job = %job,
                    title = %item.title,
                    units = item.units,
                    "Enqueued {}",
                    item.selection
                );
                metrics::ITEMS.with_label_values(&[job.as_str(), "processed"]).inc();
                self.status.update(|s| {
                    s.counters.queued_units += u64::from(item.units);
                    s.outcomes.processed.push(item);
                });
                pacing.success_delay
            }
            ItemResult::Failed(item) => {
                warn!(job = %job, title = %item.title, "Item failed: {}", item.reason);
                metrics::ITEMS.with_label_values(&[job.as_str(), "failed"]).inc();
                self.status.update(|s| s.outcomes.failed.push(item));
                pacing.failure_delay
            }
            ItemResult::Skipped(item) => {
                info!(job = %job, title = %item.title, "Item skipped: {}", item.reason);
                metrics::ITEMS.with_label_values(&[job.as_str(), "skipped"]).inc();
                self.status.update(|s| s.outcomes.skipped.push(item));
                pacing.skip_delay
            }
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        let status = self.status.snapshot();
        Checkpoint {
            job: status.job,
            source: self.source.clone(),
            provider: self.params.provider.clone(),
            destination: self.params.destination.clone(),
            current_index: self.index,
            total_count: self.items.len(),
            outcomes: status.outcomes,
            counters: status.counters,
            active: true,
            updated_at: Utc::now(),
        }
    }

    fn save_checkpoint(&self) {
        let checkpoint = self.checkpoint();
        if let Err(e) = self.store.save_checkpoint(&checkpoint) {
            warn!(
                job = %checkpoint.job,
                index = checkpoint.current_index,
                "Failed to save checkpoint: {}",
                e
            );
        }
    }

    /// Stopped before the end: keep a resumable checkpoint.
    fn halt(&self) {
        let job = self.strategy.job();
        self.save_checkpoint();

        let total = self.items.len();
        {
            let mut shared = self.status.lock();
            shared.cancel = None;
            let status = &mut shared.status;
            status.running = false;
            status.can_resume = true;
            status.phase = Phase::Idle;
            status.detail = None;
            status.current_title = None;
        }

        info!(job = %job, index = self.index, total = total, "Run stopped");
        metrics::RUNS.with_label_values(&[job.as_str(), "stopped"]).inc();
        self.notifier.warning(format!(
            "{} batch stopped by user - progress saved at {}/{}",
            job, self.index, total
        ));
    }

    /// Every item handled: drop the checkpoint.
    fn finish(&self) {
        let job = self.strategy.job();
        if let Err(e) = self.store.delete_checkpoint(job) {
            warn!(job = %job, "Failed to delete checkpoint: {}", e);
        }

        let summary = {
            let mut shared = self.status.lock();
            shared.cancel = None;
            let status = &mut shared.status;
            status.running = false;
            status.can_resume = false;
            status.phase = Phase::Idle;
            status.detail = None;
            status.current_title = None;
            format!(
                "{} batch finished: {} processed, {} failed, {} skipped",
                job,
                status.outcomes.processed.len(),
                status.outcomes.failed.len(),
                status.outcomes.skipped.len()
            )
        };

        info!(job = %job, "{}", summary);
        metrics::RUNS.with_label_values(&[job.as_str(), "completed"]).inc();
        self.notifier.success(summary);
    }
}

fn outcome(media_id: Option<u64>, title: String, reason: impl Into<String>) -> ItemOutcome {
    ItemOutcome {
        media_id,
        title,
        reason: reason.into(),
    }
}
