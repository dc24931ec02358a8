//! Mock media catalog for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::catalog::{CatalogError, MediaCatalog, MediaKind, MediaMetadata, SearchFilters};

/// Mock implementation of the MediaCatalog trait.
///
/// Entries are matched by kind and id. Title searches match any entry of
/// the same kind whose titles contain the query, ignoring case.
///
/// # Example
///
/// ```rust,ignore
/// use trove_core::testing::MockCatalog;
///
/// let catalog = MockCatalog::new();
/// catalog.add_media(MediaMetadata::new(21, MediaKind::Anime, "One Piece")).await;
///
/// // The next call fails with a message the backoff treats as transient
/// catalog.set_next_error("timeout").await;
/// ```
#[derive(Debug, Default)]
pub struct MockCatalog {
    media: Arc<RwLock<Vec<MediaMetadata>>>,
    /// Ids passed to `fetch_metadata`, in call order.
    fetch_calls: Arc<RwLock<Vec<u64>>>,
    /// Titles passed to `search_by_title`, in call order.
    search_calls: Arc<RwLock<Vec<String>>>,
    /// If set, the next call will fail with this message.
    next_error: Arc<RwLock<Option<String>>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub async fn add_media(&self, media: MediaMetadata) {
        let mut entries = self.media.write().await;
        entries.retain(|m| !(m.id == media.id && m.kind == media.kind));
        entries.push(media);
    }

    /// Make the next call fail with an API error carrying `message`.
    pub async fn set_next_error(&self, message: &str) {
        *self.next_error.write().await = Some(message.to_string());
    }

    pub async fn fetch_calls(&self) -> Vec<u64> {
        self.fetch_calls.read().await.clone()
    }

    pub async fn search_calls(&self) -> Vec<String> {
        self.search_calls.read().await.clone()
    }

    async fn take_error(&self) -> Option<CatalogError> {
        self.next_error
            .write()
            .await
            .take()
            .map(|message| CatalogError::Api { status: 500, message })
    }
}

#[async_trait]
impl MediaCatalog for MockCatalog {
    async fn fetch_metadata(
        &self,
        kind: MediaKind,
        id: u64,
    ) -> Result<Option<MediaMetadata>, CatalogError> {
        self.fetch_calls.write().await.push(id);
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        Ok(self
            .media
            .read()
            .await
            .iter()
            .find(|m| m.id == id && m.kind == kind)
            .cloned())
    }

    async fn search_by_title(
        &self,
        kind: MediaKind,
        title: &str,
        _filters: &SearchFilters,
    ) -> Result<Vec<MediaMetadata>, CatalogError> {
        self.search_calls.write().await.push(title.to_string());
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        let needle = title.to_lowercase();
        Ok(self
            .media
            .read()
            .await
            .iter()
            .filter(|m| m.kind == kind)
            .filter(|m| {
                m.search_titles()
                    .iter()
                    .any(|t| t.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect())
    }
}
