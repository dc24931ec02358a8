//! Persistent state: checkpoints, associations, reading list, chapter queue
//! and known local files.

mod sqlite;
mod types;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use sqlite::SqliteStore;
pub use types::{
    Association, Checkpoint, ItemOutcome, JobKind, OutcomeLists, ProcessedItem, QueuedChapter,
    ReadingListEntry, RunCounters, StoreError, CHECKPOINT_VERSION,
};

/// Run progress, one slot per job kind.
pub trait CheckpointStore: Send + Sync {
    fn load_checkpoint(&self, job: JobKind) -> Result<Option<Checkpoint>, StoreError>;
    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;
    fn delete_checkpoint(&self, job: JobKind) -> Result<(), StoreError>;
}

/// Content identifier to media id links. Keys are stored lower-cased.
pub trait AssociationStore: Send + Sync {
    /// Insert or replace.
    fn save_association(&self, key: &str, media_id: u64) -> Result<(), StoreError>;
    fn get_association(&self, key: &str) -> Result<Option<Association>, StoreError>;
    fn associations_for_media(&self, media_id: u64) -> Result<Vec<Association>, StoreError>;
    fn list_associations(&self) -> Result<Vec<Association>, StoreError>;
    fn delete_association(&self, key: &str) -> Result<bool, StoreError>;
    fn clear_associations(&self) -> Result<usize, StoreError>;
}

pub trait ReadingListStore: Send + Sync {
    /// Most recently read first.
    fn reading_list(&self) -> Result<Vec<ReadingListEntry>, StoreError>;
    /// Returns `false` if the media was already listed.
    fn add_to_reading_list(&self, media_id: u64) -> Result<bool, StoreError>;
    fn remove_from_reading_list(&self, media_id: u64) -> Result<bool, StoreError>;
    fn is_on_reading_list(&self, media_id: u64) -> Result<bool, StoreError>;
    fn touch_reading_list(&self, media_id: u64) -> Result<(), StoreError>;
}

/// Chapter download queue shared with the download worker.
pub trait ChapterQueueStore: Send + Sync {
    /// Idempotent per (provider, media, chapter). Returns `true` if inserted.
    fn enqueue_chapter(&self, chapter: &QueuedChapter) -> Result<bool, StoreError>;
    /// Distinct media with at least one chapter still queued.
    fn count_distinct_queued_media(&self) -> Result<u64, StoreError>;
    fn queued_chapter_count(&self, media_id: u64) -> Result<u64, StoreError>;
    fn mark_chapter_downloaded(
        &self,
        provider: &str,
        media_id: u64,
        chapter_id: &str,
    ) -> Result<bool, StoreError>;
    /// Downloaded chapter ids grouped by provider.
    fn downloaded_chapters(&self, media_id: u64) -> Result<HashMap<String, Vec<String>>, StoreError>;
}

/// Files already present in the library.
pub trait LibraryIndex: Send + Sync {
    fn record_local_file(&self, media_id: u64, path: &Path) -> Result<(), StoreError>;
    /// Directory of the most recently recorded file for the media.
    fn local_directory(&self, media_id: u64) -> Result<Option<PathBuf>, StoreError>;
}
