//! Periodic recheck of the reading list for newly released chapters.
//!
//! A series is topped up only when it is still releasing and the user has
//! already downloaded most of what the provider offers.

use std::collections::HashSet;
use std::error::Error;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::RecheckConfig;
use super::types::Phase;
use crate::catalog::{MediaCatalog, MediaKind};
use crate::connectivity::{
    sleep_or_cancel, BackoffController, BackoffPolicy, ConnectivityMonitor, Flow, PhaseReporter,
    Recovery,
};
use crate::notify::Notifier;
use crate::provider::{ChapterQuery, ProviderRegistry};
use crate::store::{ChapterQueueStore, QueuedChapter, ReadingListStore};

const JOB: &str = "recheck";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecheckError {
    #[error("recheck scheduler is not running")]
    NotRunning,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecheckStatus {
    pub running: bool,
    pub pass_in_progress: bool,
    pub phase: Phase,
    pub interval_secs: u64,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    /// Counters of the last finished pass.
    pub media_checked: usize,
    pub chapters_queued: usize,
}

/// Totals of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub media_checked: usize,
    pub chapters_queued: usize,
    /// "Title (n new)" per topped-up series.
    pub updated: Vec<String>,
}

struct State {
    status: RecheckStatus,
    cancel: Option<CancellationToken>,
    /// The most recently spawned loop; it may still be winding down after `stop`.
    task: Option<JoinHandle<()>>,
}

struct Inner {
    catalog: Arc<dyn MediaCatalog>,
    providers: ProviderRegistry,
    reading_list: Arc<dyn ReadingListStore>,
    queue: Arc<dyn ChapterQueueStore>,
    notifier: Notifier,
    connectivity: Arc<dyn ConnectivityMonitor>,
    backoff: BackoffPolicy,
    config: RecheckConfig,
    state: Mutex<State>,
    trigger: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PhaseReporter for Inner {
    fn report_phase(&self, phase: Phase, _detail: Option<String>) {
        self.lock().status.phase = phase;
    }
}

/// Background scheduler that tops up series on the reading list.
#[derive(Clone)]
pub struct RecheckScheduler {
    inner: Arc<Inner>,
}

impl RecheckScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<dyn MediaCatalog>,
        providers: ProviderRegistry,
        reading_list: Arc<dyn ReadingListStore>,
        queue: Arc<dyn ChapterQueueStore>,
        notifier: Notifier,
        connectivity: Arc<dyn ConnectivityMonitor>,
        backoff: BackoffPolicy,
        config: RecheckConfig,
    ) -> Self {
        let status = RecheckStatus {
            interval_secs: config.interval_secs,
            ..Default::default()
        };
        Self {
            inner: Arc::new(Inner {
                catalog,
                providers,
                reading_list,
                queue,
                notifier,
                connectivity,
                backoff,
                config,
                state: Mutex::new(State {
                    status,
                    cancel: None,
                    task: None,
                }),
                trigger: Notify::new(),
            }),
        }
    }

    /// Spawn the schedule loop. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let mut state = self.inner.lock();
        if state.status.running {
            return false;
        }
        let cancel = CancellationToken::new();
        state.status.running = true;
        state.cancel = Some(cancel.clone());

        info!(
            interval_secs = self.inner.config.interval_secs,
            "Starting recheck scheduler"
        );
        // A stopped loop can still be finishing its pass; never overlap two.
        let previous = state.task.take();
        let inner = Arc::clone(&self.inner);
        state.task = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    warn!("Previous recheck loop ended abnormally: {}", e);
                }
            }
            schedule(inner, cancel).await;
        }));
        true
    }

    /// Whether a loop task, possibly a stopped one still winding down, is alive.
    pub fn loop_alive(&self) -> bool {
        self.inner
            .lock()
            .task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let mut state = self.inner.lock();
        if !state.status.running {
            return false;
        }
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        state.status.running = false;
        info!("Stopped recheck scheduler");
        true
    }

    pub fn status(&self) -> RecheckStatus {
        self.inner.lock().status.clone()
    }

    /// Trigger a pass now. Returns `false` when one is already in progress.
    pub fn run_now(&self) -> Result<bool, RecheckError> {
        let state = self.inner.lock();
        if !state.status.running {
            return Err(RecheckError::NotRunning);
        }
        if state.status.pass_in_progress {
            debug!("Recheck pass already in progress, ignoring trigger");
            return Ok(false);
        }
        self.inner.trigger.notify_one();
        Ok(true)
    }

    /// Run one pass in the caller's task.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Option<PassSummary> {
        run_pass(&self.inner, cancel).await
    }
}

async fn schedule(inner: Arc<Inner>, cancel: CancellationToken) {
    let initial = Duration::from_secs(inner.config.initial_delay_secs);
    let interval = Duration::from_secs(inner.config.interval_secs);

    let mut wait = initial;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
            _ = inner.trigger.notified() => debug!("Recheck triggered manually"),
        }
        if run_pass(&inner, &cancel).await.is_none() {
            break;
        }
        wait = interval;
    }
    debug!("Recheck loop exited");
}

async fn run_pass(inner: &Inner, cancel: &CancellationToken) -> Option<PassSummary> {
    {
        let mut state = inner.lock();
        state.status.pass_in_progress = true;
        state.status.last_started_at = Some(Utc::now());
        state.status.phase = Phase::Fetching;
    }
    info!("Starting recheck pass");

    let result = check_reading_list(inner, cancel).await;

    {
        let mut state = inner.lock();
        state.status.pass_in_progress = false;
        state.status.phase = Phase::Idle;
        if let Some(summary) = &result {
            state.status.last_finished_at = Some(Utc::now());
            state.status.media_checked = summary.media_checked;
            state.status.chapters_queued = summary.chapters_queued;
        }
    }

    match &result {
        Some(summary) => {
            info!(
                checked = summary.media_checked,
                queued = summary.chapters_queued,
                "Finished recheck pass"
            );
            if summary.chapters_queued > 0 {
                inner.notifier.success(format!(
                    "Queued {} new chapters: {}",
                    summary.chapters_queued,
                    summary.updated.join(", ")
                ));
            }
        }
        None => info!("Recheck pass stopped"),
    }
    result
}

/// `None` when cancelled.
async fn check_reading_list(inner: &Inner, cancel: &CancellationToken) -> Option<PassSummary> {
    let mut summary = PassSummary::default();
    let entries = match inner.reading_list.reading_list() {
        Ok(entries) => entries,
        Err(e) => {
            error!("Failed to read reading list: {}", e);
            return Some(summary);
        }
    };
    if entries.is_empty() {
        debug!("Reading list is empty");
        return Some(summary);
    }

    let mut backoff = BackoffController::new(
        JOB,
        inner.backoff.clone(),
        Arc::clone(&inner.connectivity),
    );
    let min_ratio = inner.config.min_ratio;

    for entry in entries {
        if cancel.is_cancelled() {
            return None;
        }
        let media_id = entry.media_id;

        let downloaded = match inner.queue.downloaded_chapters(media_id) {
            Ok(downloaded) => downloaded,
            Err(e) => {
                warn!(media_id = media_id, "Failed to read downloaded chapters: {}", e);
                continue;
            }
        };
        // The provider the user actually reads from.
        let Some((provider, done)) = downloaded
            .into_iter()
            .filter(|(_, ids)| !ids.is_empty())
            .max_by(|a, b| a.1.len().cmp(&b.1.len()).then_with(|| b.0.cmp(&a.0)))
        else {
            continue;
        };

        if summary.media_checked > 0 {
            let delay = Duration::from_millis(inner.config.item_delay_ms);
            if sleep_or_cancel(delay, cancel).await == Flow::Stop {
                return None;
            }
        }
        summary.media_checked += 1;

        let catalog = &inner.catalog;
        let metadata = match with_backoff(&mut backoff, inner, cancel, Phase::Fetching, || {
            catalog.fetch_metadata(MediaKind::Manga, media_id)
        })
        .await?
        {
            Ok(Some(metadata)) => metadata,
            Ok(None) => continue,
            Err(e) => {
                warn!(media_id = media_id, "Failed to fetch metadata: {}", e);
                continue;
            }
        };
        if metadata.is_finished() {
            debug!(media_id = media_id, "Skipping finished series");
            continue;
        }

        let source = match inner.providers.chapter_source(&provider) {
            Ok(source) => source,
            Err(e) => {
                warn!(media_id = media_id, "{}", e);
                continue;
            }
        };
        let query = ChapterQuery {
            media_id,
            titles: metadata.search_titles(),
            year: metadata.year,
        };
        let query = &query;
        let source = &source;
        let chapters = match with_backoff(&mut backoff, inner, cancel, Phase::Searching, || {
            source.fetch_chapters(query)
        })
        .await?
        {
            Ok(chapters) if !chapters.is_empty() => chapters,
            Ok(_) => continue,
            Err(e) => {
                warn!(media_id = media_id, provider = %provider, "Failed to list chapters: {}", e);
                continue;
            }
        };

        let ratio = done.len() as f64 / chapters.len() as f64;
        debug!(
            media_id = media_id,
            provider = %provider,
            downloaded = done.len(),
            available = chapters.len(),
            "Checking series"
        );
        if ratio < min_ratio {
            continue;
        }

        let done: HashSet<String> = done.into_iter().collect();
        let missing: Vec<_> = chapters.iter().filter(|c| !done.contains(&c.id)).collect();
        if missing.is_empty() {
            continue;
        }

        let title = metadata.preferred_title();
        info!(media_id = media_id, title = %title, new = missing.len(), "Found new chapters");
        inner.report_phase(Phase::Queueing, None);

        let mut queued = 0;
        for (i, chapter) in missing.iter().enumerate() {
            if i > 0 {
                let delay = Duration::from_millis(inner.config.chapter_delay_ms);
                if sleep_or_cancel(delay, cancel).await == Flow::Stop {
                    return None;
                }
            }
            let item = QueuedChapter {
                provider: provider.clone(),
                media_id,
                chapter_id: chapter.id.clone(),
                chapter_number: chapter.number.clone(),
                title: chapter.title.clone(),
            };
            match inner.queue.enqueue_chapter(&item) {
                Ok(true) => queued += 1,
                Ok(false) => {}
                Err(e) => warn!(media_id = media_id, chapter = %chapter.id, "Failed to queue chapter: {}", e),
            }
        }
        inner.report_phase(Phase::Fetching, None);

        if queued > 0 {
            summary.chapters_queued += queued;
            summary.updated.push(format!("{} ({} new)", title, queued));
        }
    }

    Some(summary)
}

/// Retry transient failures; `None` when cancelled.
async fn with_backoff<T, E, F, Fut>(
    backoff: &mut BackoffController,
    reporter: &Inner,
    cancel: &CancellationToken,
    phase: Phase,
    mut call: F,
) -> Option<Result<T, E>>
where
    E: Error + Send + Sync + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    loop {
        if cancel.is_cancelled() {
            return None;
        }
        match call().await {
            Ok(value) => {
                backoff.reset();
                return Some(Ok(value));
            }
            Err(e) => match backoff.recover(&e, phase, cancel, reporter).await {
                Recovery::Retry => continue,
                Recovery::Permanent => return Some(Err(e)),
                Recovery::Cancelled => return None,
            },
        }
    }
}
