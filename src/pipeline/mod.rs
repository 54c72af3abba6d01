//! Job entry points.
//!
//! - `toplist`: crawl every period's listing pages and persist ranks
//! - `refresh`: enrich stale galleries from their detail pages
//! - `translation`: sync the tag translation feed into the key-value store
//! - `dispatch`: map trigger messages to jobs and handle run-level stops
//! - `guard`: classify source responses into bans, geo-blocks and gone items
//! - `validate`: check configuration and database setup
//!
//! Every job receives a [`CrawlContext`] built for the current invocation;
//! nothing holds a store or client handle between invocations.

pub mod dispatch;
pub mod guard;
pub mod refresh;
pub mod toplist;
pub mod translation;
pub mod validate;

use std::sync::Arc;

pub use dispatch::{JobReport, RunOptions, RunOutcome, drain_queue, handle_message, run_trigger};
pub use guard::BlockGuard;
pub use refresh::{RefreshReport, run_gallery_refresh};
pub use toplist::{ToplistReport, run_toplist_crawl};
pub use translation::{TranslationReport, run_translation_sync};
pub use validate::{SetupReport, validate_setup};

use crate::error::Result;
use crate::models::Config;
use crate::storage::{KvStore, RelationalStore, RetryPolicy, SqliteStore, TriggerQueue};
use crate::utils::http::{Fetcher, RegionalFetcher};

/// Handles shared by the jobs of one invocation.
#[derive(Clone)]
pub struct CrawlContext {
    pub config: Arc<Config>,
    pub fetcher: Arc<dyn Fetcher>,
    pub relational: Arc<dyn RelationalStore>,
    pub kv: Arc<dyn KvStore>,
    pub queue: Arc<dyn TriggerQueue>,
    pub guard: BlockGuard,
    pub retry: RetryPolicy,
}

impl CrawlContext {
    /// Validate configuration, then wire production collaborators from it.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher = Arc::new(RegionalFetcher::new(&config)?);
        let store = Arc::new(SqliteStore::open(
            &config.storage.database_path,
            &config.storage,
        )?);
        Ok(Self::new(config, fetcher, store))
    }

    /// Build from explicit collaborators; one SQLite store backs all three roles.
    pub fn new(config: Config, fetcher: Arc<dyn Fetcher>, store: Arc<SqliteStore>) -> Self {
        let guard = BlockGuard::new(&config.source);
        let retry = RetryPolicy::from_config(&config.storage);
        Self {
            config: Arc::new(config),
            fetcher,
            relational: store.clone(),
            kv: store.clone(),
            queue: store,
            guard,
            retry,
        }
    }

    /// Fetch a source-site page and run it through the block guard.
    pub async fn fetch_source_page(&self, url: &str) -> Result<String> {
        let response = self.fetcher.fetch(url).await?;
        self.guard.inspect(self.fetcher.as_ref(), response).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Context wiring for job tests.

    use std::sync::Arc;

    use super::CrawlContext;
    use crate::models::Config;
    use crate::storage::SqliteStore;
    use crate::utils::http::testing::ScriptedFetcher;

    /// Zero delays, in-memory store, scripted network.
    ///
    /// The configuration is not validated; tests may build contexts that
    /// [`CrawlContext::open`] would refuse.
    pub fn context() -> (CrawlContext, Arc<ScriptedFetcher>, Arc<SqliteStore>) {
        let mut config = Config::default();
        config.crawler.task_delay_ms = 0;
        config.crawler.item_delay_ms = 0;
        config.storage.retry_base_ms = 1;
        config.storage.retry_max_ms = 1;
        config.storage.toplist_years = vec![2023, 2024, 2025, 2026, 2027];

        let fetcher = Arc::new(ScriptedFetcher::new());
        let store = Arc::new(SqliteStore::open_in_memory(&config.storage).unwrap());
        let ctx = CrawlContext::new(config, fetcher.clone(), store.clone());
        (ctx, fetcher, store)
    }
}
