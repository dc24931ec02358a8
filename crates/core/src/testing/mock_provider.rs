//! Mock release providers and chapter sources for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::provider::{
    Candidate, Chapter, ChapterQuery, ChapterSource, ProviderError, ProviderSearch, SearchParams,
};

/// Mock implementation of the ProviderSearch trait.
///
/// Results can be configured per title; searches whose primary title has no
/// entry get the default results.
///
/// # Example
///
/// ```rust,ignore
/// use trove_core::testing::{MockProvider, fixtures};
///
/// let provider = MockProvider::named("nyaa");
/// provider.set_results(vec![fixtures::candidate("Show 1080p", 20)]).await;
///
/// let searches = provider.recorded_searches().await;
/// ```
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    /// Results for searches without a title-specific entry.
    results: Arc<RwLock<Vec<Candidate>>>,
    /// Results keyed by lower-cased primary title.
    results_by_title: Arc<RwLock<HashMap<String, Vec<Candidate>>>>,
    searches: Arc<RwLock<Vec<SearchParams>>>,
    next_error: Arc<RwLock<Option<ProviderError>>>,
}

impl MockProvider {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            results: Arc::new(RwLock::new(Vec::new())),
            results_by_title: Arc::new(RwLock::new(HashMap::new())),
            searches: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_results(&self, results: Vec<Candidate>) {
        *self.results.write().await = results;
    }

    pub async fn set_results_for(&self, title: &str, results: Vec<Candidate>) {
        self.results_by_title
            .write()
            .await
            .insert(title.to_lowercase(), results);
    }

    /// Make the next search fail.
    pub async fn set_next_error(&self, error: ProviderError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn recorded_searches(&self) -> Vec<SearchParams> {
        self.searches.read().await.clone()
    }
}

#[async_trait]
impl ProviderSearch for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<Candidate>, ProviderError> {
        self.searches.write().await.push(params.clone());
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        if let Some(title) = params.primary_title() {
            if let Some(results) = self.results_by_title.read().await.get(&title.to_lowercase()) {
                return Ok(results.clone());
            }
        }
        Ok(self.results.read().await.clone())
    }

    async fn resolve_download_link(&self, candidate: &Candidate) -> Result<String, ProviderError> {
        candidate
            .magnet_uri
            .clone()
            .or_else(|| candidate.torrent_url.clone())
            .ok_or_else(|| ProviderError::NotFound(format!("no link for {}", candidate.name)))
    }
}

/// Mock implementation of the ChapterSource trait.
#[derive(Debug)]
pub struct MockChapterSource {
    name: String,
    chapters: Arc<RwLock<HashMap<u64, Vec<Chapter>>>>,
    queries: Arc<RwLock<Vec<ChapterQuery>>>,
    next_error: Arc<RwLock<Option<ProviderError>>>,
}

impl MockChapterSource {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            chapters: Arc::new(RwLock::new(HashMap::new())),
            queries: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Chapters returned for a catalog media id.
    pub async fn set_chapters(&self, media_id: u64, chapters: Vec<Chapter>) {
        self.chapters.write().await.insert(media_id, chapters);
    }

    pub async fn set_next_error(&self, error: ProviderError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn recorded_queries(&self) -> Vec<ChapterQuery> {
        self.queries.read().await.clone()
    }
}

#[async_trait]
impl ChapterSource for MockChapterSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_chapters(&self, query: &ChapterQuery) -> Result<Vec<Chapter>, ProviderError> {
        self.queries.write().await.push(query.clone());
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        Ok(self
            .chapters
            .read()
            .await
            .get(&query.media_id)
            .cloned()
            .unwrap_or_default())
    }
}
