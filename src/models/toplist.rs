//! Toplist ranking types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::is_iso_date;

/// Highest rank the source ever lists.
pub const MAX_RANK: i64 = 200;

/// Ranking window of a toplist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Day,
    Month,
    Year,
    All,
}

impl PeriodType {
    /// Crawl order, matching the order the lists were historically fetched.
    pub const ALL: [PeriodType; 4] = [
        PeriodType::All,
        PeriodType::Year,
        PeriodType::Month,
        PeriodType::Day,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Day => "day",
            PeriodType::Month => "month",
            PeriodType::Year => "year",
            PeriodType::All => "all",
        }
    }

    /// Numeric `tl` code used by the listing URL.
    pub fn list_code(&self) -> u32 {
        match self {
            PeriodType::All => 11,
            PeriodType::Year => 12,
            PeriodType::Month => 13,
            PeriodType::Day => 15,
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "day" => Ok(PeriodType::Day),
            "month" => Ok(PeriodType::Month),
            "year" => Ok(PeriodType::Year),
            "all" => Ok(PeriodType::All),
            other => Err(AppError::validation(format!(
                "invalid period_type '{other}', expected day, month, year or all"
            ))),
        }
    }
}

/// One position on one day's list. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    pub gallery_id: i64,
    pub rank: i64,
    /// `YYYY-MM-DD`
    pub list_date: String,
    pub period_type: PeriodType,
}

impl RankEntry {
    pub fn validate(&self) -> Result<()> {
        if self.gallery_id <= 0 {
            return Err(AppError::validation(format!(
                "rank entry has invalid gallery_id {}",
                self.gallery_id
            )));
        }
        if !(1..=MAX_RANK).contains(&self.rank) {
            return Err(AppError::validation(format!(
                "rank {} outside 1..={MAX_RANK} for gallery {}",
                self.rank, self.gallery_id
            )));
        }
        if !is_iso_date(&self.list_date) {
            return Err(AppError::validation(format!(
                "list_date '{}' is not YYYY-MM-DD",
                self.list_date
            )));
        }
        Ok(())
    }
}

/// A single toplist page to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToplistPage {
    pub period_type: PeriodType,
    pub page: u32,
    pub url: String,
}

impl ToplistPage {
    /// Build the page task list: every period, `pages` pages each.
    pub fn plan(base_url: &str, pages: u32) -> Vec<ToplistPage> {
        let base = base_url.trim_end_matches('/');
        PeriodType::ALL
            .iter()
            .flat_map(|period| {
                (0..pages).map(move |page| {
                    let mut url = format!("{}/toplist.php?tl={}", base, period.list_code());
                    if page > 0 {
                        url.push_str(&format!("&p={page}"));
                    }
                    ToplistPage {
                        period_type: *period,
                        page,
                        url,
                    }
                })
            })
            .collect()
    }
}

/// A row returned by the read query: rank joined with gallery columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToplistRow {
    pub gallery_id: i64,
    pub rank: i64,
    pub gallery_name: Option<String>,
    pub gallery_type: Option<String>,
    pub tags: Option<String>,
    pub tags_zh: Option<String>,
    pub published_time: Option<String>,
    pub uploader: Option<String>,
    pub gallery_length: Option<i64>,
    pub points: Option<i64>,
    pub torrents_url: Option<String>,
    pub preview_url: Option<String>,
    pub gallery_url: Option<String>,
}
