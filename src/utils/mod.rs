//! Utility functions and helpers.

pub mod http;
pub mod log;
pub mod url;

use chrono::{Duration, NaiveDate, Utc};

use crate::error::{AppError, Result};

/// Calendar date format used for every stored date.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Current UTC calendar date as `YYYY-MM-DD`.
pub fn today_utc() -> String {
    Utc::now().date_naive().format(DATE_FORMAT).to_string()
}

/// `YYYY-MM-DD` for the date `days` before `today`.
pub fn days_before(today: NaiveDate, days: i64) -> Result<String> {
    Duration::try_days(days)
        .and_then(|span| today.checked_sub_signed(span))
        .map(|date| date.format(DATE_FORMAT).to_string())
        .ok_or_else(|| AppError::validation(format!("{days} days before {today} is out of range")))
}

/// Parse a strict `YYYY-MM-DD` date.
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

/// Whether `s` is an existing calendar date in `YYYY-MM-DD` form.
pub fn is_iso_date(s: &str) -> bool {
    parse_iso_date(s).is_some()
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
