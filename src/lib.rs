// src/lib.rs

//! Toplist archive library.
//!
//! Crawls a ranked gallery toplist through a region-pinned fetch path,
//! enriches stale galleries from their detail pages, and keeps a tag
//! translation table in sync. Jobs live in [`pipeline`]; storage seams in
//! [`storage`].

#[cfg(feature = "lambda")]
pub mod config;
pub mod error;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod models;
pub mod parsing;
pub mod pipeline;
pub mod storage;
pub mod utils;
