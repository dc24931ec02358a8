use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::catalog::AnilistConfig;
use crate::orchestrator::{OrchestratorConfig, RecheckConfig};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub catalog: AnilistConfig,
    #[serde(default)]
    pub download_client: Option<QBittorrentConfig>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub recheck: RecheckConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("trove.db")
}

/// qBittorrent Web API connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QBittorrentConfig {
    /// Web UI URL (e.g., "http://localhost:8081")
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Category assigned to added torrents.
    #[serde(default)]
    pub category: Option<String>,
}

/// Kinds of content provider
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum ProviderKind {
    /// Torznab/Jackett release search
    #[serde(rename = "torznab")]
    Torznab,
    /// MangaDex chapter listings
    #[serde(rename = "mangadex")]
    MangaDex,
}

/// A named content provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Name runs refer to (e.g., "nyaa")
    pub name: String,
    pub kind: ProviderKind,
    pub url: String,
    /// API key (torznab only)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Jackett indexer id (default: "all")
    #[serde(default)]
    pub indexer: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Preferred chapter language (mangadex only, default: "en")
    #[serde(default)]
    pub language: Option<String>,
}

fn default_timeout() -> u32 {
    30
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub catalog: AnilistConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_client: Option<SanitizedQBittorrentConfig>,
    pub providers: Vec<SanitizedProviderConfig>,
    pub orchestrator: OrchestratorConfig,
    pub recheck: RecheckConfig,
}

/// Sanitized qBittorrent config (password hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedQBittorrentConfig {
    pub url: String,
    pub username: String,
    pub password_configured: bool,
    pub timeout_secs: u32,
}

/// Sanitized provider config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            catalog: config.catalog.clone(),
            download_client: config.download_client.as_ref().map(|q| {
                SanitizedQBittorrentConfig {
                    url: q.url.clone(),
                    username: q.username.clone(),
                    password_configured: !q.password.is_empty(),
                    timeout_secs: q.timeout_secs,
                }
            }),
            providers: config
                .providers
                .iter()
                .map(|p| SanitizedProviderConfig {
                    name: p.name.clone(),
                    kind: p.kind,
                    url: p.url.clone(),
                    api_key_configured: p.api_key.as_ref().is_some_and(|k| !k.is_empty()),
                    timeout_secs: p.timeout_secs,
                })
                .collect(),
            orchestrator: config.orchestrator.clone(),
            recheck: config.recheck.clone(),
        }
    }
}
