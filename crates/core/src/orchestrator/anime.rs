//! Anime batches: find a complete-season release per media id and hand it
//! to the download engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::config::{OrchestratorConfig, Pacing};
use super::control::RunControl;
use super::input::{parse_anime_list, InputError};
use super::strategy::AcquisitionStrategy;
use super::types::{AcquireError, Phase, RunParameters, WorkItem};
use crate::catalog::{MediaCatalog, MediaKind, MediaMetadata};
use crate::download::DownloadEngine;
use crate::provider::{Candidate, ProviderRegistry, SearchParams};
use crate::selector::select_best;
use crate::store::{AssociationStore, JobKind, LibraryIndex, ProcessedItem};

const TEMP_DIR_NAME: &str = "trove-anime";

pub struct AnimeStrategy {
    catalog: Arc<dyn MediaCatalog>,
    providers: ProviderRegistry,
    engine: Arc<dyn DownloadEngine>,
    associations: Arc<dyn AssociationStore>,
    library: Arc<dyn LibraryIndex>,
    min_availability: u32,
    base_destination: Option<PathBuf>,
    library_roots: Vec<PathBuf>,
    pacing: Pacing,
}

impl AnimeStrategy {
    pub fn new(
        catalog: Arc<dyn MediaCatalog>,
        providers: ProviderRegistry,
        engine: Arc<dyn DownloadEngine>,
        associations: Arc<dyn AssociationStore>,
        library: Arc<dyn LibraryIndex>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            catalog,
            providers,
            engine,
            associations,
            library,
            min_availability: config.min_availability,
            base_destination: config.base_destination.as_ref().map(PathBuf::from),
            library_roots: config.library_roots.iter().map(PathBuf::from).collect(),
            pacing: config.pacing(JobKind::Anime),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// True when any associated content is still transferring.
    async fn is_downloading(&self, keys: &[String]) -> bool {
        match self.engine.list_active().await {
            Ok(active) => active
                .iter()
                .filter(|t| t.is_in_progress())
                .any(|t| keys.iter().any(|k| k.eq_ignore_ascii_case(&t.hash))),
            Err(e) => {
                debug!("Could not list active transfers: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl AcquisitionStrategy for AnimeStrategy {
    type Metadata = MediaMetadata;
    type Candidate = Candidate;
    type Selection = Candidate;

    fn job(&self) -> JobKind {
        JobKind::Anime
    }

    fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    fn enqueue_phase(&self) -> Phase {
        Phase::Downloading
    }

    fn parse_input(&self, raw: &[u8]) -> Result<Vec<WorkItem>, InputError> {
        parse_anime_list(raw)
    }

    fn validate(&self, params: &RunParameters) -> Result<(), String> {
        self.providers
            .search(&params.provider)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn skip_reason(&self, item: &WorkItem, _params: &RunParameters) -> Option<String> {
        let media_id = item.media_id?;
        let associations = match self.associations.associations_for_media(media_id) {
            Ok(associations) => associations,
            Err(e) => {
                warn!(media_id = media_id, "Failed to read associations: {}", e);
                return None;
            }
        };
        if associations.is_empty() {
            return None;
        }

        let keys: Vec<String> = associations.into_iter().map(|a| a.key).collect();
        if self.is_downloading(&keys).await {
            Some("Content already downloading".to_string())
        } else {
            Some("Content already associated".to_string())
        }
    }

    async fn fetch_metadata(&self, item: &WorkItem) -> Result<Option<MediaMetadata>, AcquireError> {
        let Some(media_id) = item.media_id else {
            return Ok(None);
        };
        Ok(self.catalog.fetch_metadata(MediaKind::Anime, media_id).await?)
    }

    fn describe(&self, metadata: &MediaMetadata) -> (u64, String) {
        (metadata.id, metadata.preferred_title())
    }

    async fn search_candidates(
        &self,
        metadata: &MediaMetadata,
        params: &RunParameters,
    ) -> Result<Vec<Candidate>, AcquireError> {
        let provider = self.providers.search(&params.provider)?;
        let query = SearchParams {
            media_id: Some(metadata.id),
            titles: metadata.search_titles(),
            batch: true,
        };
        Ok(provider.search(&query).await?)
    }

    fn select(
        &self,
        _metadata: &MediaMetadata,
        candidates: Vec<Candidate>,
    ) -> Result<Candidate, String> {
        if candidates.is_empty() {
            return Err("No suitable batch found".to_string());
        }
        select_best(&candidates, self.min_availability)
            .cloned()
            .ok_or_else(|| format!("No candidate with at least {} seeders", self.min_availability))
    }

    async fn resolve_destination(
        &self,
        metadata: &MediaMetadata,
        params: &RunParameters,
    ) -> PathBuf {
        match self.library.local_directory(metadata.id) {
            Ok(Some(dir)) => return dir,
            Ok(None) => {}
            Err(e) => warn!(media_id = metadata.id, "Failed to look up local files: {}", e),
        }

        let base = params
            .destination
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| self.base_destination.clone())
            .or_else(|| self.library_roots.first().cloned())
            .unwrap_or_else(|| std::env::temp_dir().join(TEMP_DIR_NAME));
        let dir = base.join(sanitize_dir_name(&metadata.preferred_title(), metadata.id));

        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!(path = %dir.display(), "Failed to create destination: {}", e);
        }
        dir
    }

    async fn enqueue(
        &self,
        _item: &WorkItem,
        metadata: &MediaMetadata,
        selection: Candidate,
        destination: &Path,
        params: &RunParameters,
        control: &mut RunControl,
    ) -> Result<ProcessedItem, AcquireError> {
        let provider = self.providers.search(&params.provider)?;
        let provider = &provider;
        let candidate = &selection;

        let link = control
            .retry(Phase::Downloading, move || async move {
                provider
                    .resolve_download_link(candidate)
                    .await
                    .map_err(AcquireError::from)
            })
            .await
            .into_result()?;

        if !self.engine.start().await {
            return Err(AcquireError::Rejected(
                "Could not start download engine".to_string(),
            ));
        }

        let engine = &self.engine;
        let links = vec![link];
        let links = &links;
        control
            .retry(Phase::Downloading, move || async move {
                engine
                    .enqueue(links, destination)
                    .await
                    .map_err(AcquireError::from)
            })
            .await
            .into_result()?;

        match selection.content_key() {
            Some(key) => {
                if let Err(e) = self.associations.save_association(&key, metadata.id) {
                    warn!(media_id = metadata.id, key = %key, "Failed to save association: {}", e);
                }
            }
            None => warn!(
                media_id = metadata.id,
                "Release has no content identifier, association not saved"
            ),
        }

        // Later runs resolve the same directory through `local_directory`.
        let release_path = destination.join(&selection.name);
        if let Err(e) = self.library.record_local_file(metadata.id, &release_path) {
            warn!(media_id = metadata.id, "Failed to record destination: {}", e);
        }

        Ok(ProcessedItem {
            media_id: Some(metadata.id),
            title: metadata.preferred_title(),
            selection: selection.name.clone(),
            availability: Some(selection.seeders),
            resolution: selection.resolution.clone(),
            units: 1,
        })
    }
}

/// Directory name derived from a title; `Anime_{id}` when nothing is left.
pub fn sanitize_dir_name(title: &str, media_id: u64) -> String {
    let replaced: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | '|' | '.' | '!' | '`' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        format!("Anime_{}", media_id)
    } else {
        trimmed.to_string()
    }
}
