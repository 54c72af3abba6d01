//! Year partitions for rank history.
//!
//! Supported years are an explicit allow-list from configuration. A date
//! outside it is a configuration error, never a silent drop.

use chrono::Datelike;

use crate::error::{AppError, Result};
use crate::utils::parse_iso_date;

/// Table holding rank entries for `year`.
pub fn table_name(year: i32) -> String {
    format!("toplist_items_{year}")
}

/// Resolve the partition table for a `YYYY-MM-DD` list date.
pub fn table_for(list_date: &str, years: &[i32]) -> Result<String> {
    let date = parse_iso_date(list_date).ok_or_else(|| {
        AppError::validation(format!("list_date '{list_date}' is not YYYY-MM-DD"))
    })?;
    let year = date.year();
    if !years.contains(&year) {
        return Err(AppError::config(format!(
            "no toplist partition for year {year}; supported: {years:?}"
        )));
    }
    Ok(table_name(year))
}
