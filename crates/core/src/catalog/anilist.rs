//! AniList GraphQL client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::spacing::RequestSpacer;
use super::types::{MediaKind, MediaMetadata, MediaStatus, SearchFilters};
use super::{CatalogError, MediaCatalog};

const MEDIA_FIELDS: &str = "id title { romaji english native } synonyms status episodes chapters startDate { year }";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnilistConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Minimum spacing between requests in milliseconds.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// How long lookups stay cached.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_url() -> String {
    "https://graphql.anilist.co".to_string()
}

fn default_min_interval_ms() -> u64 {
    1500
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

impl Default for AnilistConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            min_interval_ms: default_min_interval_ms(),
            timeout_secs: default_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

pub struct AnilistClient {
    client: Client,
    url: String,
    spacer: RequestSpacer,
}

impl AnilistClient {
    pub fn new(config: &AnilistConfig) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            spacer: RequestSpacer::new(Duration::from_millis(config.min_interval_ms)),
        })
    }

    async fn query<T: for<'de> Deserialize<'de>>(
        &self,
        query: String,
        variables: serde_json::Value,
    ) -> Result<Option<T>, CatalogError> {
        let _slot = self.spacer.acquire().await;

        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("?")
                .to_string();
            return Err(CatalogError::Unavailable(format!(
                "rate limited, retry after {}s",
                retry_after
            )));
        }
        if status.is_server_error() {
            return Err(CatalogError::Unavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let envelope: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl MediaCatalog for AnilistClient {
    async fn fetch_metadata(
        &self,
        kind: MediaKind,
        id: u64,
    ) -> Result<Option<MediaMetadata>, CatalogError> {
        debug!("AniList fetch: kind={}, id={}", kind, id);
        let query = format!(
            "query ($id: Int, $type: MediaType) {{ Media(id: $id, type: $type) {{ {} }} }}",
            MEDIA_FIELDS
        );
        let data: Option<MediaData> = self
            .query(query, json!({ "id": id, "type": kind.as_graphql() }))
            .await?;

        Ok(data.and_then(|d| d.media).map(|m| m.into_metadata(kind)))
    }

    async fn search_by_title(
        &self,
        kind: MediaKind,
        title: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<MediaMetadata>, CatalogError> {
        debug!("AniList search: kind={}, title='{}'", kind, title);
        let query = format!(
            "query ($search: String, $type: MediaType, $perPage: Int, $year: Int) {{ \
             Page(perPage: $perPage) {{ media(search: $search, type: $type, seasonYear: $year, sort: SEARCH_MATCH) {{ {} }} }} }}",
            MEDIA_FIELDS
        );
        let data: Option<PageData> = self
            .query(
                query,
                json!({
                    "search": title,
                    "type": kind.as_graphql(),
                    "perPage": filters.limit,
                    "year": filters.year,
                }),
            )
            .await?;

        Ok(data
            .map(|d| d.page.media)
            .unwrap_or_default()
            .into_iter()
            .map(|m| m.into_metadata(kind))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct MediaData {
    #[serde(rename = "Media")]
    media: Option<AnilistMedia>,
}

#[derive(Debug, Deserialize)]
struct PageData {
    #[serde(rename = "Page")]
    page: AnilistPage,
}

#[derive(Debug, Deserialize)]
struct AnilistPage {
    #[serde(default)]
    media: Vec<AnilistMedia>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnilistMedia {
    id: u64,
    title: Option<AnilistTitle>,
    #[serde(default)]
    synonyms: Vec<String>,
    status: Option<MediaStatus>,
    episodes: Option<u32>,
    chapters: Option<u32>,
    start_date: Option<FuzzyDate>,
}

#[derive(Debug, Deserialize)]
struct AnilistTitle {
    romaji: Option<String>,
    english: Option<String>,
    native: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FuzzyDate {
    year: Option<i32>,
}

impl AnilistMedia {
    fn into_metadata(self, kind: MediaKind) -> MediaMetadata {
        let (romaji, english, native) = match self.title {
            Some(t) => (t.romaji, t.english, t.native),
            None => (None, None, None),
        };
        MediaMetadata {
            id: self.id,
            kind,
            title_romaji: romaji,
            title_english: english,
            title_native: native,
            synonyms: self.synonyms,
            status: self.status,
            year: self.start_date.and_then(|d| d.year),
            episodes: self.episodes,
            chapters: self.chapters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_media_response() {
        let json = r#"{
            "data": {
                "Media": {
                    "id": 1,
                    "title": {"romaji": "Cowboy Bebop", "english": "Cowboy Bebop", "native": "カウボーイビバップ"},
                    "synonyms": ["CB"],
                    "status": "FINISHED",
                    "episodes": 26,
                    "chapters": null,
                    "startDate": {"year": 1998}
                }
            }
        }"#;
        let parsed: GraphQlResponse<MediaData> = serde_json::from_str(json).unwrap();
        let media = parsed
            .data
            .and_then(|d| d.media)
            .unwrap()
            .into_metadata(MediaKind::Anime);

        assert_eq!(media.id, 1);
        assert_eq!(media.year, Some(1998));
        assert_eq!(media.episodes, Some(26));
        assert!(media.is_finished());
        assert_eq!(media.synonyms, vec!["CB".to_string()]);
    }

    #[test]
    fn test_parse_missing_media() {
        let json = r#"{"data": {"Media": null}, "errors": [{"message": "Not Found.", "status": 404}]}"#;
        let parsed: GraphQlResponse<MediaData> = serde_json::from_str(json).unwrap();
        assert!(parsed.data.and_then(|d| d.media).is_none());
    }

    #[test]
    fn test_parse_page_response() {
        let json = r#"{"data": {"Page": {"media": [
            {"id": 2, "title": {"romaji": "Berserk"}, "status": "RELEASING"},
            {"id": 3, "title": null}
        ]}}}"#;
        let parsed: GraphQlResponse<PageData> = serde_json::from_str(json).unwrap();
        let media = parsed.data.unwrap().page.media;
        assert_eq!(media.len(), 2);
        let first = media.into_iter().next().unwrap().into_metadata(MediaKind::Manga);
        assert_eq!(first.preferred_title(), "Berserk");
        assert_eq!(first.status, Some(MediaStatus::Releasing));
    }

    #[test]
    fn test_config_defaults() {
        let config: AnilistConfig = toml::from_str("").unwrap();
        assert_eq!(config.url, "https://graphql.anilist.co");
        assert_eq!(config.min_interval_ms, 1500);
    }
}
