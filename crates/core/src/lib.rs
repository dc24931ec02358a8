//! Core library for trove: resumable batch acquisition of anime and manga.

pub mod admission;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod connectivity;
pub mod download;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod provider;
pub mod selector;
pub mod store;
pub mod testing;

pub use admission::{QueueAdmission, QueueDepth};
pub use catalog::{CachedCatalog, CatalogError, MediaCatalog, MediaKind, MediaMetadata};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use connectivity::{BackoffPolicy, RuntimeFlags};
pub use download::{DisabledEngine, DownloadEngine, DownloadError};
pub use notify::{Notification, NotificationLevel, Notifier};
pub use orchestrator::{
    AcquisitionStrategy, AnimeStrategy, JobControl, MangaStrategy, Orchestrator,
    OrchestratorError, RecheckScheduler, RunStatus, Signals, StartRequest,
};
pub use provider::{ChapterSource, ProviderRegistry, ProviderSearch};
pub use store::{CheckpointStore, JobKind, SqliteStore, StoreError};
