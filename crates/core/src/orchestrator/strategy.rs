use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::config::Pacing;
use super::control::RunControl;
use super::input::InputError;
use super::types::{AcquireError, Phase, RunParameters, WorkItem};
use crate::admission::QueueAdmission;
use crate::store::{JobKind, ProcessedItem};

/// Media specific steps plugged into the generic run loop.
///
/// The loop owns ordering, retries, checkpoints and pacing; a strategy only
/// talks to its collaborators.
#[async_trait]
pub trait AcquisitionStrategy: Send + Sync + 'static {
    type Metadata: Send + Sync + 'static;
    type Candidate: Send + Sync + 'static;
    type Selection: Send + Sync + 'static;

    fn job(&self) -> JobKind;

    fn pacing(&self) -> &Pacing;

    /// Phase shown while `enqueue` runs.
    fn enqueue_phase(&self) -> Phase;

    fn parse_input(&self, raw: &[u8]) -> Result<Vec<WorkItem>, InputError>;

    /// Check required parameters before a run starts.
    fn validate(&self, params: &RunParameters) -> Result<(), String>;

    /// Backpressure applied before each item, if any.
    fn admission(&self) -> Option<&QueueAdmission> {
        None
    }

    /// Reason to skip the item without touching the catalog.
    async fn skip_reason(&self, item: &WorkItem, params: &RunParameters) -> Option<String>;

    /// `Ok(None)` when the catalog has no match.
    async fn fetch_metadata(&self, item: &WorkItem)
        -> Result<Option<Self::Metadata>, AcquireError>;

    /// Media id and display title.
    fn describe(&self, metadata: &Self::Metadata) -> (u64, String);

    /// Skip check that needs the resolved media id.
    async fn skip_after_fetch(
        &self,
        _metadata: &Self::Metadata,
        _params: &RunParameters,
    ) -> Option<String> {
        None
    }

    async fn search_candidates(
        &self,
        metadata: &Self::Metadata,
        params: &RunParameters,
    ) -> Result<Vec<Self::Candidate>, AcquireError>;

    /// Pick what to enqueue, or the failure reason.
    fn select(
        &self,
        metadata: &Self::Metadata,
        candidates: Vec<Self::Candidate>,
    ) -> Result<Self::Selection, String>;

    async fn resolve_destination(
        &self,
        metadata: &Self::Metadata,
        params: &RunParameters,
    ) -> PathBuf;

    /// Hand the selection to the downstream queue and record the association.
    async fn enqueue(
        &self,
        item: &WorkItem,
        metadata: &Self::Metadata,
        selection: Self::Selection,
        destination: &Path,
        params: &RunParameters,
        control: &mut RunControl,
    ) -> Result<ProcessedItem, AcquireError>;
}
