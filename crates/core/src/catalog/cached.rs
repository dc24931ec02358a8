use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{MediaKind, MediaMetadata, SearchFilters};
use super::{CatalogError, MediaCatalog};
use crate::cache::TtlCache;

type SearchKey = (MediaKind, String, Option<i32>, u32);

/// Memoizes catalog lookups. Failed lookups are not cached.
pub struct CachedCatalog {
    inner: Arc<dyn MediaCatalog>,
    metadata: TtlCache<(MediaKind, u64), Option<MediaMetadata>>,
    searches: TtlCache<SearchKey, Vec<MediaMetadata>>,
}

impl CachedCatalog {
    pub fn new(inner: Arc<dyn MediaCatalog>, ttl: Duration) -> Self {
        Self {
            inner,
            metadata: TtlCache::new(ttl),
            searches: TtlCache::new(ttl),
        }
    }

    pub fn clear(&self) {
        self.metadata.clear();
        self.searches.clear();
    }
}

#[async_trait]
impl MediaCatalog for CachedCatalog {
    async fn fetch_metadata(
        &self,
        kind: MediaKind,
        id: u64,
    ) -> Result<Option<MediaMetadata>, CatalogError> {
        self.metadata
            .get_or_compute((kind, id), || self.inner.fetch_metadata(kind, id))
            .await
    }

    async fn search_by_title(
        &self,
        kind: MediaKind,
        title: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<MediaMetadata>, CatalogError> {
        let key = (kind, title.to_lowercase(), filters.year, filters.limit);
        self.searches
            .get_or_compute(key, || self.inner.search_by_title(kind, title, filters))
            .await
    }
}
