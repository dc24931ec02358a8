//! qBittorrent Web API engine.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::QBittorrentConfig;

use super::{ActiveTransfer, DownloadEngine, DownloadError, TransferState};

pub struct QBittorrentEngine {
    client: Client,
    config: QBittorrentConfig,
    /// Set once logged in; the cookie jar holds the actual session.
    authenticated: Arc<RwLock<bool>>,
}

impl QBittorrentEngine {
    pub fn new(config: QBittorrentConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            authenticated: Arc::new(RwLock::new(false)),
        }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url(), endpoint)
    }

    async fn login(&self) -> Result<(), DownloadError> {
        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(self.url("/api/v2/auth/login"))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            *self.authenticated.write().await = true;
            Ok(())
        } else if body.contains("Fails.") || status == StatusCode::FORBIDDEN {
            Err(DownloadError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(DownloadError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    async fn ensure_authenticated(&self) -> Result<(), DownloadError> {
        if *self.authenticated.read().await {
            return Ok(());
        }
        self.login().await
    }

    /// Send an authenticated request, logging in again once on 403.
    async fn send<F>(&self, build: F) -> Result<String, DownloadError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.ensure_authenticated().await?;

        let mut response = build().send().await?;
        if response.status() == StatusCode::FORBIDDEN {
            warn!("qBittorrent session expired, re-authenticating");
            *self.authenticated.write().await = false;
            self.login().await?;
            response = build().send().await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::ApiError(format!("HTTP {}", status)));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl DownloadEngine for QBittorrentEngine {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn start(&self) -> bool {
        let url = self.url("/api/v2/app/version");
        match self.send(|| self.client.get(&url)).await {
            Ok(version) => {
                info!("Connected to qBittorrent {}", version.trim());
                true
            }
            Err(e) => {
                warn!("qBittorrent is not reachable: {}", e);
                false
            }
        }
    }

    async fn enqueue(&self, links: &[String], destination: &Path) -> Result<(), DownloadError> {
        if links.is_empty() {
            return Ok(());
        }

        let url = self.url("/api/v2/torrents/add");
        let urls = links.join("\n");
        let save_path = destination.to_string_lossy().to_string();
        let category = self.config.category.clone();

        self.send(|| {
            let mut form = multipart::Form::new()
                .text("urls", urls.clone())
                .text("savepath", save_path.clone());
            if let Some(cat) = &category {
                form = form.text("category", cat.clone());
            }
            self.client.post(&url).multipart(form)
        })
        .await?;

        debug!(count = links.len(), destination = %save_path, "Added links to qBittorrent");
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<ActiveTransfer>, DownloadError> {
        let url = self.url("/api/v2/torrents/info");
        let body = self.send(|| self.client.get(&url)).await?;

        let torrents: Vec<QBTorrentInfo> = serde_json::from_str(&body)
            .map_err(|e| DownloadError::ApiError(format!("Failed to parse response: {}", e)))?;

        Ok(torrents
            .into_iter()
            .map(QBTorrentInfo::into_transfer)
            .filter(ActiveTransfer::is_in_progress)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct QBTorrentInfo {
    hash: String,
    name: String,
    state: String,
    progress: f64,
    #[serde(default)]
    save_path: String,
}

impl QBTorrentInfo {
    fn into_transfer(self) -> ActiveTransfer {
        ActiveTransfer {
            hash: self.hash.to_lowercase(),
            name: self.name,
            state: parse_qb_state(&self.state),
            progress: self.progress,
            save_path: (!self.save_path.is_empty()).then_some(self.save_path),
        }
    }
}

fn parse_qb_state(state: &str) -> TransferState {
    match state {
        "downloading" | "forcedDL" | "metaDL" | "allocating" => TransferState::Downloading,
        "uploading" | "forcedUP" => TransferState::Seeding,
        "pausedDL" | "pausedUP" | "stoppedDL" | "stoppedUP" => TransferState::Paused,
        "checkingDL" | "checkingUP" | "checkingResumeData" | "moving" => TransferState::Checking,
        "queuedDL" | "queuedUP" => TransferState::Queued,
        "stalledDL" | "stalledUP" => TransferState::Stalled,
        "error" | "missingFiles" => TransferState::Error,
        _ => TransferState::Unknown,
    }
}
