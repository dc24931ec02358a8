//! SQLite-backed store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    Association, AssociationStore, ChapterQueueStore, Checkpoint, CheckpointStore, JobKind,
    LibraryIndex, OutcomeLists, QueuedChapter, ReadingListEntry, ReadingListStore, RunCounters,
    StoreError, CHECKPOINT_VERSION,
};

/// Every store trait backed by one SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                job TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                source TEXT NOT NULL,
                provider TEXT NOT NULL,
                destination TEXT,
                current_index INTEGER NOT NULL,
                total_count INTEGER NOT NULL,
                queued_units INTEGER NOT NULL DEFAULT 0,
                outcomes TEXT NOT NULL,
                active INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS associations (
                key TEXT PRIMARY KEY,
                media_id INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_associations_media ON associations(media_id);

            CREATE TABLE IF NOT EXISTS reading_list (
                media_id INTEGER PRIMARY KEY,
                added_at TEXT NOT NULL,
                last_read_at TEXT
            );

            CREATE TABLE IF NOT EXISTS chapter_queue (
                provider TEXT NOT NULL,
                media_id INTEGER NOT NULL,
                chapter_id TEXT NOT NULL,
                chapter_number TEXT NOT NULL,
                title TEXT,
                status TEXT NOT NULL DEFAULT 'queued',
                queued_at TEXT NOT NULL,
                PRIMARY KEY (provider, media_id, chapter_id)
            );
            CREATE INDEX IF NOT EXISTS idx_chapter_queue_status ON chapter_queue(status, media_id);

            CREATE TABLE IF NOT EXISTS local_files (
                media_id INTEGER NOT NULL,
                path TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (media_id, path)
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_association(row: &rusqlite::Row) -> rusqlite::Result<Association> {
    let created_at: String = row.get(2)?;
    Ok(Association {
        key: row.get(0)?,
        media_id: row.get::<_, i64>(1)? as u64,
        created_at: parse_timestamp(&created_at),
    })
}

impl CheckpointStore for SqliteStore {
    fn load_checkpoint(&self, job: JobKind) -> Result<Option<Checkpoint>, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT version, source, provider, destination, current_index, total_count,
                        queued_units, outcomes, active, updated_at
                 FROM checkpoints WHERE job = ?",
                params![job.as_str()],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, bool>(8)?,
                        row.get::<_, String>(9)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            version,
            source,
            provider,
            destination,
            current_index,
            total_count,
            queued_units,
            outcomes,
            active,
            updated_at,
        )) = row
        else {
            return Ok(None);
        };

        if version != CHECKPOINT_VERSION {
            return Err(StoreError::IncompatibleCheckpoint {
                found: version,
                supported: CHECKPOINT_VERSION,
            });
        }

        let outcomes: OutcomeLists = serde_json::from_str(&outcomes)?;

        Ok(Some(Checkpoint {
            job,
            source,
            provider,
            destination,
            current_index: current_index.max(0) as usize,
            total_count: total_count.max(0) as usize,
            outcomes,
            counters: RunCounters {
                queued_units: queued_units.max(0) as u64,
            },
            active,
            updated_at: parse_timestamp(&updated_at),
        }))
    }

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let outcomes = serde_json::to_string(&checkpoint.outcomes)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO checkpoints (job, version, source, provider, destination, current_index,
                                      total_count, queued_units, outcomes, active, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(job) DO UPDATE SET
                version = excluded.version,
                source = excluded.source,
                provider = excluded.provider,
                destination = excluded.destination,
                current_index = excluded.current_index,
                total_count = excluded.total_count,
                queued_units = excluded.queued_units,
                outcomes = excluded.outcomes,
                active = excluded.active,
                updated_at = excluded.updated_at",
            params![
                checkpoint.job.as_str(),
                CHECKPOINT_VERSION,
                checkpoint.source,
                checkpoint.provider,
                checkpoint.destination,
                checkpoint.current_index as i64,
                checkpoint.total_count as i64,
                checkpoint.counters.queued_units as i64,
                outcomes,
                checkpoint.active,
                checkpoint.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete_checkpoint(&self, job: JobKind) -> Result<(), StoreError> {
        self.conn()
            .execute("DELETE FROM checkpoints WHERE job = ?", params![job.as_str()])?;
        Ok(())
    }
}

impl AssociationStore for SqliteStore {
    fn save_association(&self, key: &str, media_id: u64) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO associations (key, media_id, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET media_id = excluded.media_id, created_at = excluded.created_at",
            params![key.to_lowercase(), media_id as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn get_association(&self, key: &str) -> Result<Option<Association>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT key, media_id, created_at FROM associations WHERE key = ?",
                params![key.to_lowercase()],
                row_to_association,
            )
            .optional()?)
    }

    fn associations_for_media(&self, media_id: u64) -> Result<Vec<Association>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key, media_id, created_at FROM associations WHERE media_id = ? ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![media_id as i64], row_to_association)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn list_associations(&self) -> Result<Vec<Association>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT key, media_id, created_at FROM associations ORDER BY created_at")?;
        let rows = stmt.query_map([], row_to_association)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn delete_association(&self, key: &str) -> Result<bool, StoreError> {
        let deleted = self.conn().execute(
            "DELETE FROM associations WHERE key = ?",
            params![key.to_lowercase()],
        )?;
        Ok(deleted > 0)
    }

    fn clear_associations(&self) -> Result<usize, StoreError> {
        Ok(self.conn().execute("DELETE FROM associations", [])?)
    }
}

impl ReadingListStore for SqliteStore {
    fn reading_list(&self) -> Result<Vec<ReadingListEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT media_id, added_at, last_read_at FROM reading_list
             ORDER BY last_read_at IS NULL, last_read_at DESC, added_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let added_at: String = row.get(1)?;
            let last_read_at: Option<String> = row.get(2)?;
            Ok(ReadingListEntry {
                media_id: row.get::<_, i64>(0)? as u64,
                added_at: parse_timestamp(&added_at),
                last_read_at: last_read_at.as_deref().map(parse_timestamp),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn add_to_reading_list(&self, media_id: u64) -> Result<bool, StoreError> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO reading_list (media_id, added_at) VALUES (?1, ?2)",
            params![media_id as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    fn remove_from_reading_list(&self, media_id: u64) -> Result<bool, StoreError> {
        let deleted = self.conn().execute(
            "DELETE FROM reading_list WHERE media_id = ?",
            params![media_id as i64],
        )?;
        Ok(deleted > 0)
    }

    fn is_on_reading_list(&self, media_id: u64) -> Result<bool, StoreError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM reading_list WHERE media_id = ?",
            params![media_id as i64],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn touch_reading_list(&self, media_id: u64) -> Result<(), StoreError> {
        self.conn().execute(
            "UPDATE reading_list SET last_read_at = ?1 WHERE media_id = ?2",
            params![Utc::now().to_rfc3339(), media_id as i64],
        )?;
        Ok(())
    }
}

impl ChapterQueueStore for SqliteStore {
    fn enqueue_chapter(&self, chapter: &QueuedChapter) -> Result<bool, StoreError> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO chapter_queue
                (provider, media_id, chapter_id, chapter_number, title, status, queued_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'queued', ?6)",
            params![
                chapter.provider,
                chapter.media_id as i64,
                chapter.chapter_id,
                chapter.chapter_number,
                chapter.title,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    fn count_distinct_queued_media(&self) -> Result<u64, StoreError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(DISTINCT media_id) FROM chapter_queue WHERE status = 'queued'",
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn queued_chapter_count(&self, media_id: u64) -> Result<u64, StoreError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chapter_queue WHERE status = 'queued' AND media_id = ?",
            params![media_id as i64],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn mark_chapter_downloaded(
        &self,
        provider: &str,
        media_id: u64,
        chapter_id: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE chapter_queue SET status = 'downloaded'
             WHERE provider = ?1 AND media_id = ?2 AND chapter_id = ?3",
            params![provider, media_id as i64, chapter_id],
        )?;
        if updated > 0 {
            return Ok(true);
        }
        // Downloaded outside the queue.
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO chapter_queue
                (provider, media_id, chapter_id, chapter_number, title, status, queued_at)
             VALUES (?1, ?2, ?3, ?3, NULL, 'downloaded', ?4)",
            params![provider, media_id as i64, chapter_id, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    fn downloaded_chapters(&self, media_id: u64) -> Result<HashMap<String, Vec<String>>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT provider, chapter_id FROM chapter_queue
             WHERE media_id = ? AND status = 'downloaded'
             ORDER BY provider, queued_at",
        )?;
        let rows = stmt.query_map(params![media_id as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut by_provider: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let (provider, chapter_id) = row?;
            by_provider.entry(provider).or_default().push(chapter_id);
        }
        Ok(by_provider)
    }
}

impl LibraryIndex for SqliteStore {
    fn record_local_file(&self, media_id: u64, path: &Path) -> Result<(), StoreError> {
        let path = path
            .to_str()
            .ok_or_else(|| StoreError::InvalidData(format!("non UTF-8 path: {}", path.display())))?;
        self.conn().execute(
            "INSERT INTO local_files (media_id, path, recorded_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(media_id, path) DO UPDATE SET recorded_at = excluded.recorded_at",
            params![media_id as i64, path, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn local_directory(&self, media_id: u64) -> Result<Option<PathBuf>, StoreError> {
        let path: Option<String> = self
            .conn()
            .query_row(
                "SELECT path FROM local_files WHERE media_id = ?
                 ORDER BY recorded_at DESC, rowid DESC LIMIT 1",
                params![media_id as i64],
                |row| row.get(0),
            )
            .optional()?;

        Ok(path.and_then(|p| Path::new(&p).parent().map(Path::to_path_buf)))
    }
}
