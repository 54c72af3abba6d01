//! SQLite implementation of every store trait.
//!
//! One connection behind a mutex. The configured ceilings are enforced on
//! each call so that chunking bugs surface here instead of in production
//! backends with the same limits.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};

use crate::error::{AppError, Result};
use crate::models::{PeriodType, StaleGallery, StorageConfig, ToplistRow};
use crate::storage::partition::{table_for, table_name};
use crate::storage::{KvStore, QueuedTrigger, RelationalStore, Statement, TriggerQueue};
use crate::utils::is_iso_date;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS galleries (
    gallery_id      INTEGER PRIMARY KEY,
    gallery_name    TEXT,
    gallery_type    TEXT,
    tags            TEXT,
    tags_zh         TEXT,
    published_time  TEXT,
    uploader        TEXT,
    gallery_length  INTEGER,
    points          INTEGER,
    torrents_url    TEXT,
    preview_url     TEXT,
    gallery_url     TEXT,
    updated_at      TEXT
);
CREATE INDEX IF NOT EXISTS idx_galleries_updated_at ON galleries (updated_at);

CREATE TABLE IF NOT EXISTS kv_entries (
    key    TEXT PRIMARY KEY,
    value  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_state (
    name   TEXT PRIMARY KEY,
    value  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pending_triggers (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    message     TEXT NOT NULL,
    not_before  TEXT NOT NULL
);
";

const UPSERT_GALLERY: &str = "
INSERT INTO galleries (
    gallery_id, gallery_name, gallery_type, tags, published_time, uploader,
    gallery_length, points, torrents_url, preview_url, gallery_url
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
ON CONFLICT (gallery_id) DO UPDATE SET
    gallery_name   = excluded.gallery_name,
    gallery_type   = excluded.gallery_type,
    tags           = excluded.tags,
    published_time = excluded.published_time,
    uploader       = excluded.uploader,
    gallery_length = excluded.gallery_length,
    points         = excluded.points,
    torrents_url   = excluded.torrents_url,
    preview_url    = excluded.preview_url,
    gallery_url    = excluded.gallery_url
WHERE galleries.updated_at IS NULL
";

const ENRICH_GALLERY: &str = "
UPDATE galleries SET
    tags           = COALESCE(?2, tags),
    tags_zh        = COALESCE(?3, tags_zh),
    gallery_type   = COALESCE(?4, gallery_type),
    published_time = COALESCE(?5, published_time),
    uploader       = COALESCE(?6, uploader),
    gallery_length = COALESCE(?7, gallery_length),
    torrents_url   = COALESCE(?8, torrents_url),
    preview_url    = COALESCE(?9, preview_url),
    updated_at     = ?10
WHERE gallery_id = ?1
";

const STALE_FILTER: &str = "
FROM galleries
WHERE gallery_url IS NOT NULL AND gallery_url != ''
  AND (updated_at IS NULL OR updated_at < ?1)
";

/// SQLite-backed relational store, key-value store and trigger queue.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    config: StorageConfig,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and apply the schema.
    pub fn open(path: impl AsRef<Path>, config: &StorageConfig) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::with_connection(conn, config)
    }

    /// Private in-memory database; used by tests and dry runs.
    pub fn open_in_memory(config: &StorageConfig) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, config)
    }

    fn with_connection(conn: Connection, config: &StorageConfig) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            config: config.clone(),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Create missing tables, including one partition per supported year.
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        for year in &self.config.toplist_years {
            let table = table_name(*year);
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    gallery_id   INTEGER NOT NULL,
                    rank         INTEGER NOT NULL,
                    list_date    TEXT NOT NULL,
                    period_type  TEXT NOT NULL CHECK (period_type IN ('day', 'month', 'year', 'all')),
                    PRIMARY KEY (gallery_id, list_date, period_type)
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_list ON {table} (list_date, period_type, rank);"
            ))?;
        }
        Ok(())
    }

    /// Names of the rank partition tables present in the database.
    pub fn partition_tables(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name LIKE 'toplist_items_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::storage("SQLite connection lock poisoned"))
    }

    #[cfg(test)]
    pub(crate) fn conn_for_tests(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn check_limit(kind: &'static str, size: usize, limit: usize) -> Result<()> {
        if size > limit {
            return Err(AppError::BatchLimit { kind, size, limit });
        }
        Ok(())
    }

    fn apply(&self, tx: &Transaction<'_>, statement: &Statement) -> Result<usize> {
        let changed = match statement {
            Statement::UpsertGallery(g) => tx.execute(
                UPSERT_GALLERY,
                params![
                    g.gallery_id,
                    g.gallery_name,
                    g.gallery_type,
                    g.tags,
                    g.published_time,
                    g.uploader,
                    g.gallery_length,
                    g.points,
                    g.torrents_url,
                    g.preview_url,
                    g.gallery_url,
                ],
            )?,
            Statement::InsertRank(entry) => {
                let table = table_for(&entry.list_date, &self.config.toplist_years)?;
                tx.execute(
                    &format!(
                        "INSERT OR IGNORE INTO {table} (gallery_id, rank, list_date, period_type)
                         VALUES (?1, ?2, ?3, ?4)"
                    ),
                    params![
                        entry.gallery_id,
                        entry.rank,
                        entry.list_date,
                        entry.period_type.as_str()
                    ],
                )?
            }
            Statement::EnrichGallery {
                gallery_id,
                details,
                tags_zh,
                updated_at,
            } => tx.execute(
                ENRICH_GALLERY,
                params![
                    gallery_id,
                    details.tags,
                    tags_zh,
                    details.gallery_type,
                    details.published_time,
                    details.uploader,
                    details.gallery_length,
                    details.torrents_url,
                    details.preview_url,
                    updated_at,
                ],
            )?,
            Statement::StampGallery {
                gallery_id,
                updated_at,
            } => tx.execute(
                "UPDATE galleries SET updated_at = ?2 WHERE gallery_id = ?1",
                params![gallery_id, updated_at],
            )?,
        };
        Ok(changed)
    }
}

#[async_trait]
impl RelationalStore for SqliteStore {
    fn max_statements(&self) -> usize {
        self.config.max_statements_per_batch
    }

    async fn execute_batch(&self, statements: &[Statement]) -> Result<usize> {
        Self::check_limit("statement", statements.len(), self.max_statements())?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut changed = 0;
        for statement in statements {
            changed += self.apply(&tx, statement)?;
        }
        tx.commit()?;
        Ok(changed)
    }

    async fn count_stale(&self, threshold: &str) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) {STALE_FILTER}"),
            params![threshold],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    async fn select_stale(&self, threshold: &str, limit: usize) -> Result<Vec<StaleGallery>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT gallery_id, gallery_url, updated_at {STALE_FILTER}
             ORDER BY updated_at ASC, gallery_id ASC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![threshold, limit as i64], |row| {
            Ok(StaleGallery {
                gallery_id: row.get(0)?,
                gallery_url: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    async fn query_toplist(
        &self,
        list_date: &str,
        period_type: PeriodType,
    ) -> Result<Vec<ToplistRow>> {
        if !is_iso_date(list_date) {
            return Err(AppError::validation(format!(
                "list_date '{list_date}' is not YYYY-MM-DD"
            )));
        }
        let table = table_for(list_date, &self.config.toplist_years)?;

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT t.gallery_id, t.rank, g.gallery_name, g.gallery_type, g.tags, g.tags_zh,
                    g.published_time, g.uploader, g.gallery_length, g.points,
                    g.torrents_url, g.preview_url, g.gallery_url
             FROM {table} t
             LEFT JOIN galleries g ON g.gallery_id = t.gallery_id
             WHERE t.list_date = ?1 AND t.period_type = ?2
             ORDER BY t.rank ASC"
        ))?;
        let rows = stmt.query_map(params![list_date, period_type.as_str()], |row| {
            Ok(ToplistRow {
                gallery_id: row.get(0)?,
                rank: row.get(1)?,
                gallery_name: row.get(2)?,
                gallery_type: row.get(3)?,
                tags: row.get(4)?,
                tags_zh: row.get(5)?,
                published_time: row.get(6)?,
                uploader: row.get(7)?,
                gallery_length: row.get(8)?,
                points: row.get(9)?,
                torrents_url: row.get(10)?,
                preview_url: row.get(11)?,
                gallery_url: row.get(12)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    async fn get_state(&self, name: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT value FROM sync_state WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    async fn set_state(&self, name: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_state (name, value) VALUES (?1, ?2)
             ON CONFLICT (name) DO UPDATE SET value = excluded.value",
            params![name, value],
        )?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    fn read_limit(&self) -> usize {
        self.config.kv_read_batch
    }

    fn write_limit(&self) -> usize {
        self.config.kv_write_batch
    }

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        Self::check_limit("key-value read", keys.len(), self.read_limit())?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT value FROM kv_entries WHERE key = ?1")?;
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            let value: Option<String> = stmt.query_row(params![key], |row| row.get(0)).optional()?;
            if let Some(value) = value {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    async fn put_many(&self, pairs: &[(String, String)]) -> Result<()> {
        Self::check_limit("key-value write", pairs.len(), self.write_limit())?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO kv_entries (key, value) VALUES (?1, ?2)
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            )?;
            for (key, value) in pairs {
                stmt.execute(params![key, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn list_keys(&self, after: Option<&str>, limit: usize) -> Result<Vec<String>> {
        Self::check_limit("key-value read", limit, self.read_limit())?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT key FROM kv_entries WHERE key > ?1 ORDER BY key LIMIT ?2",
        )?;
        let keys = stmt
            .query_map(params![after.unwrap_or(""), limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<()> {
        Self::check_limit("key-value write", keys.len(), self.write_limit())?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM kv_entries WHERE key = ?1")?;
            for key in keys {
                stmt.execute(params![key])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl TriggerQueue for SqliteStore {
    async fn enqueue(&self, message: &str, delay: Duration) -> Result<()> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| AppError::validation(format!("trigger delay out of range: {e}")))?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO pending_triggers (message, not_before) VALUES (?1, ?2)",
            params![message, timestamp(Utc::now() + delay)],
        )?;
        Ok(())
    }

    async fn lease_due(&self, now: DateTime<Utc>, lease: Duration) -> Result<Vec<QueuedTrigger>> {
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| AppError::validation(format!("queue lease out of range: {e}")))?;
        let hidden_until = timestamp(now + lease);

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let due: Vec<QueuedTrigger> = {
            let mut stmt = tx.prepare(
                "SELECT id, message FROM pending_triggers
                 WHERE not_before <= ?1
                 ORDER BY not_before ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![timestamp(now)], |row| {
                Ok(QueuedTrigger {
                    id: row.get(0)?,
                    message: row.get(1)?,
                })
            })?;
            rows.collect::<std::result::Result<_, _>>()?
        };
        for trigger in &due {
            tx.execute(
                "UPDATE pending_triggers SET not_before = ?2 WHERE id = ?1",
                params![trigger.id, hidden_until],
            )?;
        }
        tx.commit()?;
        Ok(due)
    }

    async fn ack(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM pending_triggers WHERE id = ?1", params![id])?;
        Ok(())
    }
}
