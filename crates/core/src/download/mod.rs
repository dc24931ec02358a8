//! Download engine integration.

mod qbittorrent;
mod types;

pub use qbittorrent::QBittorrentEngine;
pub use types::{ActiveTransfer, DownloadError, TransferState};

use std::path::Path;

use async_trait::async_trait;

/// Moves bytes for enqueued links.
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Make sure the engine is reachable and ready. Returns `false` if not.
    async fn start(&self) -> bool;

    /// Add links (magnets or torrent URLs) saving into `destination`.
    async fn enqueue(&self, links: &[String], destination: &Path) -> Result<(), DownloadError>;

    async fn list_active(&self) -> Result<Vec<ActiveTransfer>, DownloadError>;
}

/// Stand-in used when no download client is configured. Never starts, so
/// anime items fail instead of silently going nowhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledEngine;

#[async_trait]
impl DownloadEngine for DisabledEngine {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn start(&self) -> bool {
        false
    }

    async fn enqueue(&self, _links: &[String], _destination: &Path) -> Result<(), DownloadError> {
        Err(DownloadError::ApiError("no download client configured".to_string()))
    }

    async fn list_active(&self) -> Result<Vec<ActiveTransfer>, DownloadError> {
        Ok(Vec::new())
    }
}
