//! Resumable batch acquisition.
//!
//! One generic [`Orchestrator`] drives a work list through a pluggable
//! [`AcquisitionStrategy`]:
//! - **Anime**: catalog lookup by id, batch release search, download engine
//! - **Manga**: catalog lookup by title, chapter listing, chapter queue
//!
//! Progress is checkpointed before every item so a stopped or crashed run
//! resumes where it left off. [`RecheckScheduler`] periodically tops up
//! series on the reading list.

mod anime;
mod config;
mod control;
mod input;
mod manga;
mod recheck;
mod runner;
mod strategy;
mod types;

pub use anime::{sanitize_dir_name, AnimeStrategy};
pub use config::{OrchestratorConfig, Pacing, PacingOverrides, RecheckConfig};
pub use control::{Attempt, RunControl, StatusHandle};
pub use input::{parse_anime_list, parse_manga_export, InputError};
pub use manga::{association_key, title_association_key, MangaStrategy};
pub use recheck::{PassSummary, RecheckError, RecheckScheduler, RecheckStatus};
pub use runner::{JobControl, Orchestrator};
pub use strategy::AcquisitionStrategy;
pub use types::{
    AcquireError, InputPreview, ItemResult, OrchestratorError, Phase, RunParameters, RunStatus,
    Signals, StartRequest, WorkItem,
};
