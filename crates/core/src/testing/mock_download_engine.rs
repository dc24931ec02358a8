//! Mock download engine for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::download::{ActiveTransfer, DownloadEngine, DownloadError};

/// An `enqueue` call recorded for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueuedDownload {
    pub links: Vec<String>,
    pub destination: PathBuf,
}

/// Mock implementation of the DownloadEngine trait.
///
/// Provides controllable behavior for testing:
/// - Refuse to start
/// - Report configurable active transfers
/// - Fail the next enqueue
#[derive(Debug)]
pub struct MockDownloadEngine {
    start_result: Arc<RwLock<bool>>,
    enqueued: Arc<RwLock<Vec<EnqueuedDownload>>>,
    active: Arc<RwLock<Vec<ActiveTransfer>>>,
    next_error: Arc<RwLock<Option<DownloadError>>>,
}

impl Default for MockDownloadEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDownloadEngine {
    pub fn new() -> Self {
        Self {
            start_result: Arc::new(RwLock::new(true)),
            enqueued: Arc::new(RwLock::new(Vec::new())),
            active: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_start_result(&self, ready: bool) {
        *self.start_result.write().await = ready;
    }

    pub async fn set_active(&self, transfers: Vec<ActiveTransfer>) {
        *self.active.write().await = transfers;
    }

    pub async fn set_next_error(&self, error: DownloadError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn enqueued(&self) -> Vec<EnqueuedDownload> {
        self.enqueued.read().await.clone()
    }
}

#[async_trait]
impl DownloadEngine for MockDownloadEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(&self) -> bool {
        *self.start_result.read().await
    }

    async fn enqueue(&self, links: &[String], destination: &Path) -> Result<(), DownloadError> {
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        self.enqueued.write().await.push(EnqueuedDownload {
            links: links.to_vec(),
            destination: destination.to_path_buf(),
        });
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<ActiveTransfer>, DownloadError> {
        Ok(self.active.read().await.clone())
    }
}
