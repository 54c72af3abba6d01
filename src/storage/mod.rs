//! Storage abstractions for the archive.
//!
//! Three collaborators sit behind traits:
//! - [`RelationalStore`]: galleries, year-partitioned rank history, sync state
//! - [`KvStore`]: flat `namespace:tag` → localized text
//! - [`TriggerQueue`]: delayed trigger messages
//!
//! Every store enforces a per-call ceiling. Callers go through [`batch`] and
//! [`kv`], which chunk to those ceilings and apply the bounded retry.
//!
//! ## Relational layout
//!
//! ```text
//! galleries               gallery_id PK, summary columns, tags_zh, updated_at
//! toplist_items_<year>    (gallery_id, list_date, period_type) PK, rank
//! sync_state              name PK, value
//! kv_entries              key PK, value
//! pending_triggers        id, message, not_before
//! ```

pub mod batch;
pub mod kv;
pub mod partition;
pub mod sqlite;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{GalleryDetails, GallerySummary, PeriodType, RankEntry, StaleGallery, ToplistRow};

pub use batch::{RetryPolicy, execute_chunked, with_retry};
pub use kv::{DiffReport, diff_write, get_chunked};
pub use sqlite::SqliteStore;

/// One independent write, executed as part of an atomic batch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Insert a toplist sighting; existing rows are only overwritten while
    /// they have never been enriched.
    UpsertGallery(GallerySummary),

    /// Insert-or-ignore into the partition for the entry's year.
    InsertRank(RankEntry),

    /// Merge detail-page attributes. `None` fields keep the stored value.
    EnrichGallery {
        gallery_id: i64,
        details: GalleryDetails,
        tags_zh: Option<String>,
        updated_at: String,
    },

    /// Only move `updated_at`, so the row leaves the refresh selection.
    StampGallery { gallery_id: i64, updated_at: String },
}

/// Relational store with a per-call statement ceiling.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Largest number of statements accepted by one [`execute_batch`] call.
    ///
    /// [`execute_batch`]: RelationalStore::execute_batch
    fn max_statements(&self) -> usize;

    /// Execute all statements atomically. Returns the number of rows changed.
    async fn execute_batch(&self, statements: &[Statement]) -> Result<usize>;

    /// Number of galleries due for a detail refresh.
    async fn count_stale(&self, threshold: &str) -> Result<u64>;

    /// Galleries due for refresh, never-enriched first, oldest next.
    async fn select_stale(&self, threshold: &str, limit: usize) -> Result<Vec<StaleGallery>>;

    /// Rank-ordered rows for one list.
    async fn query_toplist(&self, list_date: &str, period_type: PeriodType)
    -> Result<Vec<ToplistRow>>;

    async fn get_state(&self, name: &str) -> Result<Option<String>>;

    async fn set_state(&self, name: &str, value: &str) -> Result<()>;
}

/// Key-value store with per-call read and write ceilings.
#[async_trait]
pub trait KvStore: Send + Sync {
    fn read_limit(&self) -> usize;

    fn write_limit(&self) -> usize;

    /// Values for the keys that exist.
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, String>>;

    async fn put_many(&self, pairs: &[(String, String)]) -> Result<()>;

    /// Up to `limit` stored keys strictly after `after`, in key order.
    async fn list_keys(&self, after: Option<&str>, limit: usize) -> Result<Vec<String>>;

    async fn delete_many(&self, keys: &[String]) -> Result<()>;
}

/// A leased queue message; acknowledge it once handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTrigger {
    pub id: i64,
    pub message: String,
}

/// Persistent queue of delayed trigger messages.
///
/// Delivery is at-least-once: a leased message that is not acknowledged
/// before its lease runs out is delivered again.
#[async_trait]
pub trait TriggerQueue: Send + Sync {
    async fn enqueue(&self, message: &str, delay: Duration) -> Result<()>;

    /// Lease every message due at `now`, oldest first. Each stays hidden
    /// until `now + lease`.
    async fn lease_due(&self, now: DateTime<Utc>, lease: Duration) -> Result<Vec<QueuedTrigger>>;

    /// Remove a handled message.
    async fn ack(&self, id: i64) -> Result<()>;
}
