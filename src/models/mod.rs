// src/models/mod.rs

//! Domain models for the archive crawler.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod gallery;
mod toplist;
mod translation;
mod trigger;

// Re-export all public types
pub use config::{
    Config, CrawlerConfig, LoggingConfig, RefreshConfig, SourceConfig, StorageConfig,
    TranslationConfig,
};
pub use gallery::{GalleryDetails, GallerySummary, StaleGallery};
pub use toplist::{MAX_RANK, PeriodType, RankEntry, ToplistPage, ToplistRow};
pub use translation::{
    NamespaceBlock, ReleaseAsset, ReleaseManifest, TagDatabase, TagRecord,
};
pub use trigger::CrawlTrigger;

/// Parsed contents of one toplist page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToplistExtract {
    pub galleries: Vec<GallerySummary>,
    pub rank_entries: Vec<RankEntry>,
}
