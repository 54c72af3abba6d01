//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Upper bound for the refresh staleness window, about a century.
const MAX_STALE_DAYS: i64 = 36_500;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Source site endpoints and block signatures
    #[serde(default)]
    pub source: SourceConfig,

    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Detail refresh selection
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Database location, partitions and per-call ceilings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Tag translation feed
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Log verbosity
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text and apply environment overrides.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            let mut config = Self::default();
            config.apply_env();
            config
        })
    }

    /// Override secrets and paths from the environment.
    pub fn apply_env(&mut self) {
        if let Ok(member_id) = std::env::var("EH_MEMBER_ID") {
            self.source.member_id = Some(member_id);
        }
        if let Ok(pass_hash) = std::env::var("EH_PASS_HASH") {
            self.source.pass_hash = Some(pass_hash);
        }
        if let Ok(path) = std::env::var("ARCHIVE_DB_PATH") {
            self.storage.database_path = path;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.source.base_url)?;
        url::Url::parse(&self.source.trace_url)?;
        url::Url::parse(&self.translation.release_url)?;
        if self.source.ban_phrase.trim().is_empty() {
            return Err(AppError::validation("source.ban_phrase is empty"));
        }
        if self.source.require_session && self.source.session_cookie().is_none() {
            return Err(AppError::config(
                "source.require_session is set but member_id/pass_hash are missing",
            ));
        }
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.pages_per_period == 0 {
            return Err(AppError::validation("crawler.pages_per_period must be > 0"));
        }
        if !(1..=MAX_STALE_DAYS).contains(&self.refresh.stale_after_days) {
            return Err(AppError::validation(format!(
                "refresh.stale_after_days must be within 1..={MAX_STALE_DAYS}"
            )));
        }
        if self.refresh.batch_size == 0 {
            return Err(AppError::validation("refresh.batch_size must be > 0"));
        }
        if self.storage.toplist_years.is_empty() {
            return Err(AppError::validation("storage.toplist_years is empty"));
        }
        if self.storage.max_statements_per_batch == 0
            || self.storage.kv_read_batch == 0
            || self.storage.kv_write_batch == 0
        {
            return Err(AppError::validation("storage batch ceilings must be > 0"));
        }
        if self.storage.queue_lease_secs == 0 {
            return Err(AppError::validation("storage.queue_lease_secs must be > 0"));
        }
        if self.storage.retry_attempts == 0 {
            return Err(AppError::validation("storage.retry_attempts must be > 0"));
        }
        if self.translation.asset_name.trim().is_empty() {
            return Err(AppError::validation("translation.asset_name is empty"));
        }
        Ok(())
    }
}

/// Source site settings: where to crawl and how blocks look.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Site root, e.g. `https://e-hentai.org`
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Body text that marks a temporary IP ban, whatever the status
    #[serde(default = "defaults::ban_phrase")]
    pub ban_phrase: String,

    /// Page-level markers treated like 404
    #[serde(default = "defaults::not_found_markers")]
    pub not_found_markers: Vec<String>,

    /// Diagnostic endpoint returning `key=value` lines
    #[serde(default = "defaults::trace_url")]
    pub trace_url: String,

    /// Edge locations whose geo-block aborts the run
    #[serde(default = "defaults::flagged_regions")]
    pub flagged_regions: Vec<String>,

    /// HTTP(S) proxy pinned to the egress region
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// Relay endpoint taking the target as `?to=<url>`
    #[serde(default)]
    pub relay_url: Option<String>,

    /// Session cookie `ipb_member_id`
    #[serde(default)]
    pub member_id: Option<String>,

    /// Session cookie `ipb_pass_hash`
    #[serde(default)]
    pub pass_hash: Option<String>,

    /// Fail the run when credentials are missing
    #[serde(default)]
    pub require_session: bool,
}

impl SourceConfig {
    /// Cookie header value for the source site, if credentials are set.
    pub fn session_cookie(&self) -> Option<String> {
        match (self.member_id.as_deref(), self.pass_hash.as_deref()) {
            (Some(id), Some(hash)) if !id.is_empty() && !hash.is_empty() => {
                Some(format!("ipb_member_id={id}; ipb_pass_hash={hash}"))
            }
            _ => None,
        }
    }

    /// Host name of the source site.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            ban_phrase: defaults::ban_phrase(),
            not_found_markers: defaults::not_found_markers(),
            trace_url: defaults::trace_url(),
            flagged_regions: defaults::flagged_regions(),
            proxy_url: None,
            relay_url: None,
            member_id: None,
            pass_hash: None,
            require_session: false,
        }
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between toplist pages in milliseconds
    #[serde(default = "defaults::task_delay")]
    pub task_delay_ms: u64,

    /// Delay between gallery detail requests in milliseconds
    #[serde(default = "defaults::item_delay")]
    pub item_delay_ms: u64,

    /// Toplist pages fetched per period type
    #[serde(default = "defaults::pages_per_period")]
    pub pages_per_period: u32,

    /// Delay before a banned run is retriggered
    #[serde(default = "defaults::ban_cooldown")]
    pub ban_cooldown_secs: u64,
}

impl CrawlerConfig {
    pub fn task_delay(&self) -> Duration {
        Duration::from_millis(self.task_delay_ms)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn ban_cooldown(&self) -> Duration {
        Duration::from_secs(self.ban_cooldown_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            task_delay_ms: defaults::task_delay(),
            item_delay_ms: defaults::item_delay(),
            pages_per_period: defaults::pages_per_period(),
            ban_cooldown_secs: defaults::ban_cooldown(),
        }
    }
}

/// Detail refresh selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Rows older than this many days are refreshed
    #[serde(default = "defaults::stale_after_days")]
    pub stale_after_days: i64,

    /// Maximum rows processed per run
    #[serde(default = "defaults::refresh_batch")]
    pub batch_size: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            stale_after_days: defaults::stale_after_days(),
            batch_size: defaults::refresh_batch(),
        }
    }
}

/// Storage location, partition allow-list and per-call ceilings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "defaults::database_path")]
    pub database_path: String,

    /// Years with a `toplist_items_<year>` table. Adding one is deliberate.
    #[serde(default = "defaults::toplist_years")]
    pub toplist_years: Vec<i32>,

    /// Statements per relational batch call
    #[serde(default = "defaults::max_statements")]
    pub max_statements_per_batch: usize,

    /// Keys per key-value read call
    #[serde(default = "defaults::kv_read_batch")]
    pub kv_read_batch: usize,

    /// Pairs per key-value write call
    #[serde(default = "defaults::kv_write_batch")]
    pub kv_write_batch: usize,

    /// Total attempts for transient store failures
    #[serde(default = "defaults::retry_attempts")]
    pub retry_attempts: u32,

    /// First backoff step in milliseconds
    #[serde(default = "defaults::retry_base")]
    pub retry_base_ms: u64,

    /// Backoff cap in milliseconds
    #[serde(default = "defaults::retry_max")]
    pub retry_max_ms: u64,

    /// How long a drained trigger stays hidden before it is redelivered
    #[serde(default = "defaults::queue_lease")]
    pub queue_lease_secs: u64,
}

impl StorageConfig {
    pub fn queue_lease(&self) -> Duration {
        Duration::from_secs(self.queue_lease_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: defaults::database_path(),
            toplist_years: defaults::toplist_years(),
            max_statements_per_batch: defaults::max_statements(),
            kv_read_batch: defaults::kv_read_batch(),
            kv_write_batch: defaults::kv_write_batch(),
            retry_attempts: defaults::retry_attempts(),
            retry_base_ms: defaults::retry_base(),
            retry_max_ms: defaults::retry_max(),
            queue_lease_secs: defaults::queue_lease(),
        }
    }
}

/// Tag translation feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// "Latest release" API endpoint
    #[serde(default = "defaults::release_url")]
    pub release_url: String,

    /// Asset file name inside the release
    #[serde(default = "defaults::asset_name")]
    pub asset_name: String,

    /// Pseudo-namespaces that carry layout metadata, not tags
    #[serde(default = "defaults::excluded_namespaces")]
    pub excluded_namespaces: Vec<String>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            release_url: defaults::release_url(),
            asset_name: defaults::asset_name(),
            excluded_namespaces: defaults::excluded_namespaces(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    // Source defaults
    pub fn base_url() -> String {
        "https://e-hentai.org".into()
    }
    pub fn ban_phrase() -> String {
        "This IP address has been temporarily banned".into()
    }
    pub fn not_found_markers() -> Vec<String> {
        vec!["Gallery not found.".into()]
    }
    pub fn trace_url() -> String {
        "https://cloudflare.com/cdn-cgi/trace".into()
    }
    pub fn flagged_regions() -> Vec<String> {
        vec!["GB".into()]
    }

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; toplist-archive/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn task_delay() -> u64 {
        5000
    }
    pub fn item_delay() -> u64 {
        5000
    }
    pub fn pages_per_period() -> u32 {
        4
    }
    pub fn ban_cooldown() -> u64 {
        3600
    }

    // Refresh defaults
    pub fn stale_after_days() -> i64 {
        30
    }
    pub fn refresh_batch() -> usize {
        100
    }

    // Storage defaults
    pub fn database_path() -> String {
        "data/archive.db".into()
    }
    pub fn toplist_years() -> Vec<i32> {
        vec![2023, 2024, 2025, 2026]
    }
    pub fn max_statements() -> usize {
        1000
    }
    pub fn kv_read_batch() -> usize {
        100
    }
    pub fn kv_write_batch() -> usize {
        10_000
    }
    pub fn retry_attempts() -> u32 {
        2
    }
    pub fn retry_base() -> u64 {
        100
    }
    pub fn retry_max() -> u64 {
        1000
    }
    pub fn queue_lease() -> u64 {
        900
    }

    // Translation defaults
    pub fn release_url() -> String {
        "https://api.github.com/repos/EhTagTranslation/Database/releases/latest".into()
    }
    pub fn asset_name() -> String {
        "db.text.json".into()
    }
    pub fn excluded_namespaces() -> Vec<String> {
        vec!["rows".into()]
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
