//! Content providers: release search for anime and chapter listings for manga.

mod mangadex;
mod torznab;
mod types;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

pub use mangadex::MangaDexSource;
pub use torznab::{is_batch_release, TorznabProvider};
pub use types::{
    hash_from_magnet, parse_resolution, Candidate, Chapter, ChapterQuery, ProviderError,
    SearchParams,
};

use crate::config::{ProviderConfig, ProviderKind};

/// Release search backend.
#[async_trait]
pub trait ProviderSearch: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, params: &SearchParams) -> Result<Vec<Candidate>, ProviderError>;

    /// Turn a candidate into something the download engine accepts.
    async fn resolve_download_link(&self, candidate: &Candidate) -> Result<String, ProviderError>;
}

/// Chapter listing backend.
#[async_trait]
pub trait ChapterSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_chapters(&self, query: &ChapterQuery) -> Result<Vec<Chapter>, ProviderError>;
}

/// Named providers available to runs.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    search: HashMap<String, Arc<dyn ProviderSearch>>,
    chapters: HashMap<String, Arc<dyn ChapterSource>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured provider.
    pub fn from_config(providers: &[ProviderConfig]) -> Self {
        let mut registry = Self::new();
        for provider in providers {
            match provider.kind {
                ProviderKind::Torznab => {
                    registry.register_search(Arc::new(TorznabProvider::new(provider.clone())));
                }
                ProviderKind::MangaDex => {
                    registry.register_chapter_source(Arc::new(MangaDexSource::new(
                        provider.clone(),
                    )));
                }
            }
        }
        registry
    }

    pub fn register_search(&mut self, provider: Arc<dyn ProviderSearch>) {
        self.search.insert(provider.name().to_string(), provider);
    }

    pub fn register_chapter_source(&mut self, source: Arc<dyn ChapterSource>) {
        self.chapters.insert(source.name().to_string(), source);
    }

    pub fn search(&self, name: &str) -> Result<Arc<dyn ProviderSearch>, ProviderError> {
        self.search
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
    }

    pub fn chapter_source(&self, name: &str) -> Result<Arc<dyn ChapterSource>, ProviderError> {
        self.chapters
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
    }

    pub fn search_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.search.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn chapter_source_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.chapters.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("search", &self.search_names())
            .field("chapters", &self.chapter_source_names())
            .finish()
    }
}
