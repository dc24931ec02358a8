//! Manga batches: resolve each exported title, list its chapters and put
//! them on the shared chapter queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::config::{OrchestratorConfig, Pacing};
use super::control::{Attempt, RunControl};
use super::input::{parse_manga_export, InputError};
use super::strategy::AcquisitionStrategy;
use super::types::{AcquireError, Phase, RunParameters, WorkItem};
use crate::admission::QueueAdmission;
use crate::catalog::{MediaCatalog, MediaKind, MediaMetadata, SearchFilters};
use crate::connectivity::Flow;
use crate::provider::{Chapter, ChapterQuery, ProviderRegistry};
use crate::selector::most_relevant;
use crate::store::{
    AssociationStore, ChapterQueueStore, JobKind, ProcessedItem, QueuedChapter, ReadingListStore,
};

/// Association key marking a series whose chapters were queued.
pub fn association_key(provider: &str, media_id: u64) -> String {
    format!("manga:{}:{}", provider, media_id)
}

/// Association key for an exported title, checked before any catalog call.
pub fn title_association_key(provider: &str, title: &str) -> String {
    format!("manga:{}:title:{}", provider, title.to_lowercase())
}

const ALREADY_QUEUED: &str = "Chapters already queued";

pub struct MangaStrategy {
    catalog: Arc<dyn MediaCatalog>,
    providers: ProviderRegistry,
    associations: Arc<dyn AssociationStore>,
    reading_list: Arc<dyn ReadingListStore>,
    queue: Arc<dyn ChapterQueueStore>,
    admission: QueueAdmission,
    pacing: Pacing,
}

impl MangaStrategy {
    pub fn new(
        catalog: Arc<dyn MediaCatalog>,
        providers: ProviderRegistry,
        associations: Arc<dyn AssociationStore>,
        reading_list: Arc<dyn ReadingListStore>,
        queue: Arc<dyn ChapterQueueStore>,
        admission: QueueAdmission,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            catalog,
            providers,
            associations,
            reading_list,
            queue,
            admission,
            pacing: config.pacing(JobKind::Manga),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }
}

#[async_trait]
impl AcquisitionStrategy for MangaStrategy {
    type Metadata = MediaMetadata;
    type Candidate = Chapter;
    type Selection = Vec<Chapter>;

    fn job(&self) -> JobKind {
        JobKind::Manga
    }

    fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    fn enqueue_phase(&self) -> Phase {
        Phase::Queueing
    }

    fn parse_input(&self, raw: &[u8]) -> Result<Vec<WorkItem>, InputError> {
        parse_manga_export(raw)
    }

    fn validate(&self, params: &RunParameters) -> Result<(), String> {
        self.providers
            .chapter_source(&params.provider)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn admission(&self) -> Option<&QueueAdmission> {
        Some(&self.admission)
    }

    async fn skip_reason(&self, item: &WorkItem, params: &RunParameters) -> Option<String> {
        let key = match (item.media_id, item.title.as_deref()) {
            (Some(media_id), _) => association_key(&params.provider, media_id),
            (None, Some(title)) => title_association_key(&params.provider, title),
            (None, None) => return None,
        };
        match self.associations.get_association(&key) {
            Ok(Some(_)) => Some(ALREADY_QUEUED.to_string()),
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, "Failed to read association: {}", e);
                None
            }
        }
    }

    async fn fetch_metadata(&self, item: &WorkItem) -> Result<Option<MediaMetadata>, AcquireError> {
        if let Some(media_id) = item.media_id {
            return Ok(self.catalog.fetch_metadata(MediaKind::Manga, media_id).await?);
        }
        let Some(title) = item.title.as_deref() else {
            return Ok(None);
        };

        let results = self
            .catalog
            .search_by_title(MediaKind::Manga, title, &SearchFilters::default())
            .await?;
        Ok(most_relevant(&results).cloned())
    }

    fn describe(&self, metadata: &MediaMetadata) -> (u64, String) {
        (metadata.id, metadata.preferred_title())
    }

    async fn skip_after_fetch(
        &self,
        metadata: &MediaMetadata,
        params: &RunParameters,
    ) -> Option<String> {
        let key = association_key(&params.provider, metadata.id);
        match self.associations.get_association(&key) {
            Ok(Some(_)) => Some(ALREADY_QUEUED.to_string()),
            Ok(None) => None,
            Err(e) => {
                warn!(media_id = metadata.id, "Failed to read association: {}", e);
                None
            }
        }
    }

    async fn search_candidates(
        &self,
        metadata: &MediaMetadata,
        params: &RunParameters,
    ) -> Result<Vec<Chapter>, AcquireError> {
        let source = self.providers.chapter_source(&params.provider)?;
        let query = ChapterQuery {
            media_id: metadata.id,
            titles: metadata.search_titles(),
            year: metadata.year,
        };
        Ok(source.fetch_chapters(&query).await?)
    }

    fn select(
        &self,
        _metadata: &MediaMetadata,
        chapters: Vec<Chapter>,
    ) -> Result<Vec<Chapter>, String> {
        if chapters.is_empty() {
            return Err("No chapters found".to_string());
        }
        Ok(chapters)
    }

    async fn resolve_destination(
        &self,
        _metadata: &MediaMetadata,
        _params: &RunParameters,
    ) -> PathBuf {
        // The queue worker decides where chapters land.
        PathBuf::new()
    }

    async fn enqueue(
        &self,
        item: &WorkItem,
        metadata: &MediaMetadata,
        chapters: Vec<Chapter>,
        _destination: &Path,
        params: &RunParameters,
        control: &mut RunControl,
    ) -> Result<ProcessedItem, AcquireError> {
        let total = chapters.len();
        let mut accepted = 0usize;
        let mut inserted = 0usize;
        let mut last_error = None;

        for (n, chapter) in chapters.iter().enumerate() {
            if n > 0 {
                let spacing = if control.is_playback_active() {
                    self.pacing.playback_unit_delay
                } else {
                    self.pacing.unit_delay
                };
                if control.pause(spacing).await == Flow::Stop {
                    return Err(AcquireError::Cancelled);
                }
            }
            if control.wait_until_online(Phase::Queueing).await == Flow::Stop {
                return Err(AcquireError::Cancelled);
            }
            control.set_detail(
                Phase::Queueing,
                format!("Chapter {} ({}/{})", chapter.number, n + 1, total),
            );

            let queued = QueuedChapter {
                provider: params.provider.clone(),
                media_id: metadata.id,
                chapter_id: chapter.id.clone(),
                chapter_number: chapter.number.clone(),
                title: chapter.title.clone(),
            };
            let queue = &self.queue;
            let queued = &queued;
            match control
                .retry(Phase::Queueing, move || async move {
                    queue.enqueue_chapter(queued).map_err(AcquireError::from)
                })
                .await
            {
                Attempt::Done(added) => {
                    accepted += 1;
                    if added {
                        inserted += 1;
                    }
                }
                Attempt::Failed(e) => {
                    warn!(
                        media_id = metadata.id,
                        chapter = %chapter.id,
                        "Failed to queue chapter: {}", e
                    );
                    last_error = Some(e);
                }
                Attempt::Cancelled => return Err(AcquireError::Cancelled),
            }
        }

        if accepted == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        debug!(
            media_id = metadata.id,
            "Queued {} new of {} chapters ({} rejected)",
            inserted,
            total,
            total - accepted
        );

        if let Err(e) = self.reading_list.add_to_reading_list(metadata.id) {
            warn!(media_id = metadata.id, "Failed to add to reading list: {}", e);
        }
        let mut keys = vec![association_key(&params.provider, metadata.id)];
        if let Some(title) = item.title.as_deref() {
            keys.push(title_association_key(&params.provider, title));
        }
        for key in keys {
            if let Err(e) = self.associations.save_association(&key, metadata.id) {
                warn!(media_id = metadata.id, key = %key, "Failed to save association: {}", e);
            }
        }

        Ok(ProcessedItem {
            media_id: Some(metadata.id),
            title: metadata.preferred_title(),
            selection: format!("{} chapters", accepted),
            availability: None,
            resolution: None,
            units: u32::try_from(accepted).unwrap_or(u32::MAX),
        })
    }
}
