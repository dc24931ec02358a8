//! MangaDex chapter listings.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::ProviderConfig;

use super::{Chapter, ChapterQuery, ChapterSource, ProviderError};

const FEED_PAGE_SIZE: usize = 500;
const MAX_FEED_PAGES: usize = 20;

pub struct MangaDexSource {
    client: Client,
    config: ProviderConfig,
}

impl MangaDexSource {
    pub fn new(config: ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .user_agent(concat!("trove/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn language(&self) -> &str {
        self.config.language.as_deref().unwrap_or("en")
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, ProviderError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api(format!("HTTP {} from MangaDex", status)));
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::Api(format!("Failed to parse response: {}", e)))
    }

    async fn find_manga_id(&self, query: &ChapterQuery) -> Result<Option<String>, ProviderError> {
        for title in query.titles.iter().filter(|t| !t.trim().is_empty()) {
            let mut url = format!(
                "{}/manga?title={}&limit=5",
                self.base_url(),
                urlencoding::encode(title)
            );
            if let Some(year) = query.year {
                url.push_str(&format!("&year={}", year));
            }

            let found: MangaList = self.get_json(&url).await?;
            if let Some(first) = found.data.into_iter().next() {
                debug!(title = %title, manga = %first.id, "Matched MangaDex series");
                return Ok(Some(first.id));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ChapterSource for MangaDexSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn fetch_chapters(&self, query: &ChapterQuery) -> Result<Vec<Chapter>, ProviderError> {
        let Some(manga_id) = self.find_manga_id(query).await? else {
            return Ok(Vec::new());
        };

        let mut chapters = Vec::new();
        let mut seen = HashSet::new();
        for page in 0..MAX_FEED_PAGES {
            let url = format!(
                "{}/manga/{}/feed?translatedLanguage[]={}&order[chapter]=asc&limit={}&offset={}",
                self.base_url(),
                manga_id,
                urlencoding::encode(self.language()),
                FEED_PAGE_SIZE,
                page * FEED_PAGE_SIZE
            );
            let feed: ChapterFeed = self.get_json(&url).await?;
            let fetched = feed.data.len();

            chapters.extend(dedupe_chapters(feed.data, &mut seen));

            if fetched < FEED_PAGE_SIZE || (page + 1) * FEED_PAGE_SIZE >= feed.total {
                break;
            }
        }

        Ok(chapters)
    }
}

/// Keep the first upload of every chapter number.
fn dedupe_chapters(entries: Vec<ChapterEntry>, seen: &mut HashSet<String>) -> Vec<Chapter> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let number = entry.attributes.chapter.unwrap_or_else(|| "0".to_string());
            seen.insert(number.clone()).then(|| Chapter {
                id: entry.id,
                number,
                title: entry.attributes.title.filter(|t| !t.is_empty()),
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct MangaList {
    data: Vec<MangaEntry>,
}

#[derive(Debug, Deserialize)]
struct MangaEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChapterFeed {
    data: Vec<ChapterEntry>,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
struct ChapterEntry {
    id: String,
    attributes: ChapterAttributes,
}

#[derive(Debug, Deserialize)]
struct ChapterAttributes {
    chapter: Option<String>,
    title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feed_and_dedupe() {
        let json = r#"{
            "result": "ok",
            "data": [
                {"id": "a", "attributes": {"chapter": "1", "title": "Start"}},
                {"id": "b", "attributes": {"chapter": "1", "title": "Start (alt scan)"}},
                {"id": "c", "attributes": {"chapter": "2", "title": ""}},
                {"id": "d", "attributes": {"chapter": null, "title": "Oneshot"}}
            ],
            "total": 4
        }"#;
        let feed: ChapterFeed = serde_json::from_str(json).unwrap();
        let mut seen = HashSet::new();
        let chapters = dedupe_chapters(feed.data, &mut seen);

        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].id, "a");
        assert_eq!(chapters[1].number, "2");
        assert_eq!(chapters[1].title, None);
        assert_eq!(chapters[2].number, "0");
    }
}
