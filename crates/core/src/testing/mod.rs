//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of every external service
//! trait, so acquisition runs can be exercised end to end without a
//! catalog, indexer or download engine.
//!
//! # Example
//!
//! ```rust,ignore
//! use trove_core::testing::{fixtures, MockCatalog, MockDownloadEngine, MockProvider};
//!
//! let catalog = MockCatalog::new();
//! let provider = MockProvider::named("nyaa");
//! let engine = MockDownloadEngine::new();
//!
//! catalog.add_media(fixtures::anime(1, "Show")).await;
//! provider.set_results(vec![fixtures::candidate("Show 1080p", 20)]).await;
//! ```

mod mock_catalog;
mod mock_download_engine;
mod mock_provider;

pub use mock_catalog::MockCatalog;
pub use mock_download_engine::{EnqueuedDownload, MockDownloadEngine};
pub use mock_provider::{MockChapterSource, MockProvider};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::catalog::{MediaKind, MediaMetadata, MediaStatus};
    use crate::download::{ActiveTransfer, TransferState};
    use crate::provider::{Candidate, Chapter};

    /// A batch release with a hash derived from its name.
    pub fn candidate(name: &str, seeders: u32) -> Candidate {
        let hash: String = format!("{:040x}", fnv(name));
        Candidate {
            name: name.to_string(),
            seeders,
            resolution: crate::provider::parse_resolution(name),
            magnet_uri: Some(format!("magnet:?xt=urn:btih:{}", hash)),
            info_hash: hash,
            torrent_url: None,
            size_bytes: 1024 * 1024 * 1024 * 2, // 2 GB
            provider: "mock".to_string(),
        }
    }

    pub fn anime(id: u64, title: &str) -> MediaMetadata {
        let mut media = MediaMetadata::new(id, MediaKind::Anime, title);
        media.status = Some(MediaStatus::Finished);
        media.episodes = Some(12);
        media
    }

    pub fn manga(id: u64, title: &str) -> MediaMetadata {
        let mut media = MediaMetadata::new(id, MediaKind::Manga, title);
        media.status = Some(MediaStatus::Releasing);
        media
    }

    /// `count` chapters numbered from 1, ids prefixed with the media id.
    pub fn chapters(media_id: u64, count: u32) -> Vec<Chapter> {
        (1..=count)
            .map(|n| Chapter {
                id: format!("{}-ch{}", media_id, n),
                number: n.to_string(),
                title: None,
            })
            .collect()
    }

    pub fn transfer(hash: &str, progress: f64) -> ActiveTransfer {
        ActiveTransfer {
            hash: hash.to_lowercase(),
            name: format!("transfer {}", hash),
            state: if progress < 1.0 {
                TransferState::Downloading
            } else {
                TransferState::Seeding
            },
            progress,
            save_path: None,
        }
    }

    fn fnv(s: &str) -> u128 {
        s.bytes().fold(0x6c62272e07bb014262b821756295c58d, |h: u128, b| {
            (h ^ b as u128).wrapping_mul(0x0000000001000000000000000000013B)
        })
    }
}
