// src/parsing/mod.rs

//! HTML extraction for the source site.
//!
//! Everything here is a pure transform from markup to records. When the
//! source markup drifts, this is the only module that should change.

pub mod gallery;
pub mod tags;
pub mod toplist;

pub use gallery::parse_gallery_details;
pub use tags::{abbreviate_namespace, parse_tag_block, translate_tags};
pub use toplist::parse_toplist;

use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::error::{AppError, Result};

/// Compile a CSS selector, reporting the offending text on failure.
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AppError::selector(css, e))
}

/// Compile a regular expression used for inline-handler scraping.
pub(crate) fn pattern(re: &str) -> Result<Regex> {
    Regex::new(re).map_err(|e| AppError::selector(re, e))
}

/// Collected, trimmed text content of an element.
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// First capture group of `re` in `haystack`.
pub(crate) fn capture<'h>(re: &Regex, haystack: &'h str) -> Option<&'h str> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}
