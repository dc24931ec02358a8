//! Torznab search through a Jackett instance.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::ProviderConfig;

use super::types::{hash_from_magnet, parse_resolution};
use super::{Candidate, ProviderError, ProviderSearch, SearchParams};

/// Release search against Jackett's JSON results endpoint.
pub struct TorznabProvider {
    client: Client,
    config: ProviderConfig,
}

impl TorznabProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    fn indexer(&self) -> &str {
        self.config.indexer.as_deref().unwrap_or("all")
    }

    fn build_search_url(&self, query: &str) -> String {
        format!(
            "{}/api/v2.0/indexers/{}/results?apikey={}&Query={}",
            self.config.url.trim_end_matches('/'),
            urlencoding::encode(self.indexer()),
            urlencoding::encode(self.config.api_key.as_deref().unwrap_or_default()),
            urlencoding::encode(query)
        )
    }

    async fn query(&self, query: &str) -> Result<Vec<Candidate>, ProviderError> {
        let url = self.build_search_url(query);
        debug!(provider = %self.config.name, query = query, "Searching torznab");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: JackettResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Api(format!("Failed to parse response: {}", e)))?;

        Ok(parsed
            .Results
            .into_iter()
            .map(|r| self.to_candidate(r))
            .collect())
    }

    fn to_candidate(&self, r: JackettResult) -> Candidate {
        let info_hash = r
            .InfoHash
            .map(|h| h.to_lowercase())
            .or_else(|| r.MagnetUri.as_deref().and_then(hash_from_magnet))
            .unwrap_or_default();

        Candidate {
            resolution: parse_resolution(&r.Title),
            name: r.Title,
            seeders: r.Seeders.unwrap_or(0).max(0) as u32,
            info_hash,
            magnet_uri: r.MagnetUri,
            torrent_url: r.Link,
            size_bytes: r.Size.unwrap_or(0).max(0) as u64,
            provider: self.config.name.clone(),
        }
    }
}

#[async_trait]
impl ProviderSearch for TorznabProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<Candidate>, ProviderError> {
        let Some(title) = params.primary_title() else {
            return Ok(Vec::new());
        };

        let mut candidates = self.query(title).await?;
        if params.batch {
            candidates.retain(|c| is_batch_release(&c.name));
        }
        debug!(
            provider = %self.config.name,
            results = candidates.len(),
            "Torznab search complete"
        );
        Ok(candidates)
    }

    async fn resolve_download_link(&self, candidate: &Candidate) -> Result<String, ProviderError> {
        if let Some(magnet) = &candidate.magnet_uri {
            return Ok(magnet.clone());
        }
        if !candidate.info_hash.is_empty() {
            return Ok(format!(
                "magnet:?xt=urn:btih:{}&dn={}",
                candidate.info_hash,
                urlencoding::encode(&candidate.name)
            ));
        }
        candidate
            .torrent_url
            .clone()
            .ok_or_else(|| ProviderError::NotFound(format!("no link for {}", candidate.name)))
    }
}

/// Episode spans such as "01-12", "E01 ~ E24" or "[1-13]".
static EPISODE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[\s\[(])(?:e|ep)?\d{1,4}\s?[-~]\s?(?:e|ep)?\d{1,4}(?:$|[\s\])])").unwrap()
});

/// Whether a release name looks like a full season or series batch.
pub fn is_batch_release(name: &str) -> bool {
    let lower = name.to_lowercase();
    ["batch", "complete", "season pack", "bd box"]
        .iter()
        .any(|m| lower.contains(m))
        || EPISODE_RANGE.is_match(&lower)
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JackettResponse {
    Results: Vec<JackettResult>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JackettResult {
    Title: String,
    MagnetUri: Option<String>,
    Link: Option<String>,
    InfoHash: Option<String>,
    Size: Option<i64>,
    Seeders: Option<i32>,
}
