//! Remote media catalog.
//!
//! AniList is the only backend. Lookups go through a [`RequestSpacer`] so the
//! whole process never exceeds the catalog's request budget, and
//! [`CachedCatalog`] memoizes answers in a TTL cache.

mod anilist;
mod cached;
mod spacing;
mod types;

pub use anilist::{AnilistClient, AnilistConfig};
pub use cached::CachedCatalog;
pub use spacing::RequestSpacer;
pub use types::{MediaKind, MediaMetadata, MediaStatus, SearchFilters};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Rate limited or server side failure; worth retrying later.
    #[error("Catalog temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Catalog API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

/// Metadata lookups used by acquisition jobs.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// Fetch one entry. `Ok(None)` when the id does not exist.
    async fn fetch_metadata(
        &self,
        kind: MediaKind,
        id: u64,
    ) -> Result<Option<MediaMetadata>, CatalogError>;

    /// Search by title, most relevant first.
    async fn search_by_title(
        &self,
        kind: MediaKind,
        title: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<MediaMetadata>, CatalogError>;
}
