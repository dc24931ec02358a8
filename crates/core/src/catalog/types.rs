use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Anime,
    Manga,
}

impl MediaKind {
    pub fn as_graphql(&self) -> &'static str {
        match self {
            MediaKind::Anime => "ANIME",
            MediaKind::Manga => "MANGA",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Anime => write!(f, "anime"),
            MediaKind::Manga => write!(f, "manga"),
        }
    }
}

/// Publication status reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaStatus {
    Finished,
    Releasing,
    NotYetReleased,
    Cancelled,
    Hiatus,
}

/// Catalog entry for one anime or manga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub id: u64,
    pub kind: MediaKind,
    pub title_romaji: Option<String>,
    pub title_english: Option<String>,
    pub title_native: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    pub status: Option<MediaStatus>,
    pub year: Option<i32>,
    pub episodes: Option<u32>,
    pub chapters: Option<u32>,
}

impl MediaMetadata {
    pub fn new(id: u64, kind: MediaKind, title: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            title_romaji: Some(title.into()),
            title_english: None,
            title_native: None,
            synonyms: Vec::new(),
            status: None,
            year: None,
            episodes: None,
            chapters: None,
        }
    }

    /// Display title: English, then romaji, then native.
    pub fn preferred_title(&self) -> String {
        [&self.title_english, &self.title_romaji, &self.title_native]
            .into_iter()
            .flatten()
            .find(|t| !t.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| format!("{} {}", self.kind, self.id))
    }

    /// Distinct non-empty titles to search with, romaji first.
    pub fn search_titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = Vec::new();
        let all = [&self.title_romaji, &self.title_english]
            .into_iter()
            .flatten()
            .chain(self.synonyms.iter());
        for title in all {
            let title = title.trim();
            if !title.is_empty() && !titles.iter().any(|t| t.eq_ignore_ascii_case(title)) {
                titles.push(title.to_string());
            }
        }
        titles
    }

    pub fn is_finished(&self) -> bool {
        self.status == Some(MediaStatus::Finished)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchFilters {
    pub year: Option<i32>,
    pub limit: u32,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            year: None,
            limit: 5,
        }
    }
}
