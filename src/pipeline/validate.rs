// src/pipeline/validate.rs

use chrono::{Datelike, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::models::Config;
use crate::storage::SqliteStore;
use crate::utils::log;

/// What a setup check found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupReport {
    pub database_path: String,
    pub partitions: Vec<String>,
    pub current_year: i32,
    /// Today's rank entries have a partition to land in
    pub current_year_supported: bool,
    pub session: bool,
    pub proxy: bool,
    pub relay: bool,
}

/// Validate configuration and make sure the database and its partitions exist.
///
/// An unlisted current year is only a warning here; the toplist crawl turns
/// it into a configuration error when it first writes.
pub fn validate_setup(config: &Config) -> Result<SetupReport> {
    log::header("Validating setup");

    if let Err(e) = config.validate() {
        ::log::error!("Config validation failed: {e}");
        return Err(e);
    }
    log::sub_item(&format!("User agent: {}", config.crawler.user_agent));
    log::sub_item(&format!("Timeout: {}s", config.crawler.timeout_secs));
    log::sub_item(&format!(
        "Delays: {}ms between pages, {}ms between galleries",
        config.crawler.task_delay_ms, config.crawler.item_delay_ms
    ));

    let store = SqliteStore::open(&config.storage.database_path, &config.storage)?;
    let partitions = store.partition_tables()?;
    log::sub_item(&format!(
        "Database {} ({} partitions: {})",
        config.storage.database_path,
        partitions.len(),
        partitions.join(", ")
    ));

    let current_year = Utc::now().year();
    let current_year_supported = config.storage.toplist_years.contains(&current_year);
    if !current_year_supported {
        ::log::warn!(
            "storage.toplist_years does not include {current_year}; toplist crawls will fail until it is added"
        );
    }

    let report = SetupReport {
        database_path: config.storage.database_path.clone(),
        partitions,
        current_year,
        current_year_supported,
        session: config.source.session_cookie().is_some(),
        proxy: config.source.proxy_url.is_some(),
        relay: config.source.relay_url.is_some(),
    };
    log::summary(
        "Setup",
        &[
            ("session", report.session.to_string()),
            ("proxy", report.proxy.to_string()),
            ("relay", report.relay.to_string()),
            ("current_year_supported", report.current_year_supported.to_string()),
        ],
    );
    Ok(report)
}
