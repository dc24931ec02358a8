use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version written into every checkpoint row.
pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checkpoint version {found} is not supported (expected {supported})")]
    IncompatibleCheckpoint { found: u32, supported: u32 },

    #[error("Invalid stored value: {0}")]
    InvalidData(String),
}

/// Batch job types. At most one run per kind is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Anime,
    Manga,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Anime => "anime",
            JobKind::Manga => "manga",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anime" => Ok(JobKind::Anime),
            "manga" => Ok(JobKind::Manga),
            other => Err(format!("unknown job kind: {}", other)),
        }
    }
}

/// An item that was enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedItem {
    pub media_id: Option<u64>,
    pub title: String,
    /// Chosen release name or a chapter summary.
    pub selection: String,
    pub availability: Option<u32>,
    pub resolution: Option<String>,
    /// Units enqueued for this item (1 release, or N chapters).
    pub units: u32,
}

/// An item that failed or was skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub media_id: Option<u64>,
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeLists {
    pub processed: Vec<ProcessedItem>,
    pub failed: Vec<ItemOutcome>,
    pub skipped: Vec<ItemOutcome>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub queued_units: u64,
}

/// Durable progress of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub job: JobKind,
    /// Input file the work list was loaded from.
    pub source: String,
    pub provider: String,
    pub destination: Option<String>,
    /// Index of the next item to process.
    pub current_index: usize,
    pub total_count: usize,
    pub outcomes: OutcomeLists,
    pub counters: RunCounters,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Content identifier linked to the media it was acquired for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub key: String,
    pub media_id: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingListEntry {
    pub media_id: u64,
    pub added_at: DateTime<Utc>,
    pub last_read_at: Option<DateTime<Utc>>,
}

/// A chapter waiting in the download queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedChapter {
    pub provider: String,
    pub media_id: u64,
    pub chapter_id: String,
    pub chapter_number: String,
    pub title: Option<String>,
}
