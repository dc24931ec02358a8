//! Batch input formats.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::types::WorkItem;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("malformed input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("input contains no valid entries")]
    Empty,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnimeList {
    #[serde(default)]
    dead_entries: Vec<Value>,
}

/// `{"deadEntries": ["21", 1535, ...]}`: positive media ids, input order.
pub fn parse_anime_list(raw: &[u8]) -> Result<Vec<WorkItem>, InputError> {
    let list: AnimeList = serde_json::from_slice(raw)?;
    let items: Vec<WorkItem> = list
        .dead_entries
        .iter()
        .filter_map(|entry| {
            let id = match entry {
                Value::String(s) => s.trim().parse::<u64>().ok(),
                Value::Number(n) => n.as_u64(),
                _ => None,
            };
            if id.is_none() || id == Some(0) {
                debug!("Dropping invalid anime entry: {}", entry);
            }
            id.filter(|id| *id > 0)
        })
        .map(WorkItem::by_id)
        .collect();

    if items.is_empty() {
        return Err(InputError::Empty);
    }
    Ok(items)
}

#[derive(Deserialize)]
struct MangaExportEntry {
    #[serde(default)]
    title: Option<String>,
}

/// `[{"title": "..."}]`: titles cut at the first newline, blanks dropped.
pub fn parse_manga_export(raw: &[u8]) -> Result<Vec<WorkItem>, InputError> {
    let entries: Vec<MangaExportEntry> = serde_json::from_slice(raw)?;
    let items: Vec<WorkItem> = entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title?;
            let title = title.split('\n').next().unwrap_or_default().trim();
            (!title.is_empty()).then(|| WorkItem::by_title(title))
        })
        .collect();

    if items.is_empty() {
        return Err(InputError::Empty);
    }
    Ok(items)
}
