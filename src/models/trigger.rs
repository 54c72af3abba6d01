//! Trigger messages consumed by the job dispatcher.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// An opaque task marker. Delivery is at-least-once; every job it starts
/// is idempotent with respect to redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrawlTrigger {
    #[serde(rename = "crawl-toplists")]
    CrawlToplists,
    #[serde(rename = "update-gallery")]
    UpdateGallery,
    #[serde(rename = "crawl-tags-translation")]
    CrawlTagsTranslation,
}

impl CrawlTrigger {
    pub fn message(&self) -> &'static str {
        match self {
            CrawlTrigger::CrawlToplists => "crawl-toplists",
            CrawlTrigger::UpdateGallery => "update-gallery",
            CrawlTrigger::CrawlTagsTranslation => "crawl-tags-translation",
        }
    }
}

impl fmt::Display for CrawlTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl FromStr for CrawlTrigger {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "crawl-toplists" => Ok(CrawlTrigger::CrawlToplists),
            "update-gallery" => Ok(CrawlTrigger::UpdateGallery),
            "crawl-tags-translation" => Ok(CrawlTrigger::CrawlTagsTranslation),
            other => Err(AppError::validation(format!(
                "unexpected trigger message '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_parse_back() {
        for trigger in [
            CrawlTrigger::CrawlToplists,
            CrawlTrigger::UpdateGallery,
            CrawlTrigger::CrawlTagsTranslation,
        ] {
            assert_eq!(trigger.message().parse::<CrawlTrigger>().unwrap(), trigger);
        }
        assert!("crawl-everything".parse::<CrawlTrigger>().is_err());
    }

    #[test]
    fn test_serde_uses_message_names() {
        let json = serde_json::to_string(&CrawlTrigger::UpdateGallery).unwrap();
        assert_eq!(json, "\"update-gallery\"");
    }
}
