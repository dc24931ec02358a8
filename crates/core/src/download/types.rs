use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DownloadError::Timeout
        } else if e.is_connect() {
            DownloadError::ConnectionFailed(e.to_string())
        } else {
            DownloadError::ApiError(e.to_string())
        }
    }
}

/// State of a transfer in the download engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Downloading,
    Seeding,
    Paused,
    Checking,
    Queued,
    Stalled,
    Error,
    Unknown,
}

/// A transfer currently known to the download engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTransfer {
    /// Lower-cased info hash.
    pub hash: String,
    pub name: String,
    pub state: TransferState,
    /// 0.0 to 1.0.
    pub progress: f64,
    pub save_path: Option<String>,
}

impl ActiveTransfer {
    /// Still moving bytes or waiting to.
    pub fn is_in_progress(&self) -> bool {
        self.progress < 1.0
            && matches!(
                self.state,
                TransferState::Downloading
                    | TransferState::Queued
                    | TransferState::Stalled
                    | TransferState::Checking
            )
    }
}
