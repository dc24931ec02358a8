//! Types for batch acquisition runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::CatalogError;
use crate::connectivity::{ConnectivityMonitor, PlaybackMonitor, RuntimeFlags};
use crate::download::DownloadError;
use crate::provider::ProviderError;
use crate::store::{ItemOutcome, JobKind, OutcomeLists, ProcessedItem, RunCounters, StoreError};

/// Errors returned by control operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{0} run already in progress")]
    AlreadyRunning(JobKind),

    #[error("{0} run is not running")]
    NotRunning(JobKind),

    #[error("no resumable {0} run")]
    NoResumableState(JobKind),

    #[error("cannot reset {0} while a run is in progress")]
    CannotResetWhileRunning(JobKind),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised while acquiring a single item.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Per-item failure with a user-facing reason.
    #[error("{0}")]
    Rejected(String),

    #[error("cancelled")]
    Cancelled,
}

/// What a run is doing right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Fetching,
    Searching,
    Downloading,
    Queueing,
    Waiting,
    WaitingOffline,
    WaitingPlayback,
    WaitingQueue,
    Stopping,
}

/// One entry of the work list. At least one field is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub media_id: Option<u64>,
    pub title: Option<String>,
}

impl WorkItem {
    pub fn by_id(media_id: u64) -> Self {
        Self {
            media_id: Some(media_id),
            title: None,
        }
    }

    pub fn by_title(title: impl Into<String>) -> Self {
        Self {
            media_id: None,
            title: Some(title.into()),
        }
    }

    /// Display label before metadata is known.
    pub fn label(&self) -> String {
        match (&self.title, self.media_id) {
            (Some(title), _) => title.clone(),
            (None, Some(id)) => format!("#{}", id),
            (None, None) => "(unknown)".to_string(),
        }
    }
}

/// Parameters fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParameters {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

/// Start request as received from callers.
///
/// With `resume` set, every other field comes from the checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    pub source: Option<String>,
    pub provider: Option<String>,
    pub destination: Option<String>,
    pub resume: bool,
}

/// Result of parsing an input file without starting a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputPreview {
    pub total_count: usize,
    /// First few item labels.
    pub sample: Vec<String>,
}

/// Final disposition of one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemResult {
    Processed(ProcessedItem),
    Failed(ItemOutcome),
    Skipped(ItemOutcome),
}

/// Snapshot of a run, live or restored from a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    pub job: JobKind,
    pub running: bool,
    /// A checkpoint exists that `start` with `resume` would pick up.
    pub can_resume: bool,
    /// Completed items.
    pub current_index: usize,
    pub total_count: usize,
    pub current_title: Option<String>,
    pub phase: Phase,
    pub detail: Option<String>,
    pub source: Option<String>,
    pub provider: Option<String>,
    #[serde(flatten)]
    pub outcomes: OutcomeLists,
    pub counters: RunCounters,
    pub run_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
}

impl RunStatus {
    pub fn idle(job: JobKind) -> Self {
        Self {
            job,
            running: false,
            can_resume: false,
            current_index: 0,
            total_count: 0,
            current_title: None,
            phase: Phase::Idle,
            detail: None,
            source: None,
            provider: None,
            outcomes: OutcomeLists::default(),
            counters: RunCounters::default(),
            run_id: None,
            started_at: None,
        }
    }
}

/// Process-wide signals a run consults.
#[derive(Clone)]
pub struct Signals {
    pub connectivity: Arc<dyn ConnectivityMonitor>,
    pub playback: Arc<dyn PlaybackMonitor>,
}

impl Signals {
    pub fn from_flags(flags: &RuntimeFlags) -> Self {
        Self {
            connectivity: Arc::new(flags.clone()),
            playback: Arc::new(flags.clone()),
        }
    }
}
