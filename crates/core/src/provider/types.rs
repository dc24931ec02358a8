use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A downloadable release returned by a provider search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    /// Seeders reported by the provider.
    pub seeders: u32,
    pub resolution: Option<String>,
    /// Lower-cased BitTorrent info hash, empty when the provider omits it.
    pub info_hash: String,
    pub magnet_uri: Option<String>,
    pub torrent_url: Option<String>,
    pub size_bytes: u64,
    pub provider: String,
}

impl Candidate {
    /// Identifier used for associations: the info hash, or the link when the
    /// provider did not report one.
    pub fn content_key(&self) -> Option<String> {
        if !self.info_hash.is_empty() {
            return Some(self.info_hash.to_lowercase());
        }
        self.magnet_uri
            .as_deref()
            .and_then(hash_from_magnet)
            .or_else(|| self.torrent_url.as_ref().map(|u| u.to_lowercase()))
    }
}

/// Extract the btih hash from a magnet URI.
pub fn hash_from_magnet(magnet: &str) -> Option<String> {
    let lower = magnet.to_lowercase();
    let start = lower.find("xt=urn:btih:")? + "xt=urn:btih:".len();
    let hash: String = lower[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    (!hash.is_empty()).then_some(hash)
}

/// Pull a resolution tag out of a release name.
pub fn parse_resolution(name: &str) -> Option<String> {
    let lower = name.to_lowercase();
    ["2160p", "4k", "1080p", "720p", "576p", "480p"]
        .iter()
        .find(|r| lower.contains(*r))
        .map(|r| r.to_string())
}

/// What to search a provider for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    pub media_id: Option<u64>,
    /// Titles to try, most preferred first.
    pub titles: Vec<String>,
    /// Only return season/complete batches.
    pub batch: bool,
}

impl SearchParams {
    pub fn primary_title(&self) -> Option<&str> {
        self.titles.iter().map(String::as_str).find(|t| !t.trim().is_empty())
    }
}

/// One chapter offered by a chapter source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub number: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterQuery {
    pub media_id: u64,
    pub titles: Vec<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Provider request timeout")]
    Timeout,

    #[error("Provider API error: {0}")]
    Api(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_connect() {
            ProviderError::ConnectionFailed(e.to_string())
        } else {
            ProviderError::Api(e.to_string())
        }
    }
}
