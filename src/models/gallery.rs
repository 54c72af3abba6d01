//! Gallery records: the toplist summary and detail-page enrichment.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::is_iso_date;

/// A gallery as first seen on a toplist row.
///
/// `updated_at` is only written by the detail refresh; a toplist sighting
/// never sets it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GallerySummary {
    pub gallery_id: i64,
    pub gallery_name: String,
    pub gallery_type: String,
    /// Comma-joined namespaced tags, e.g. `a:artist-name, f:glasses`
    pub tags: String,
    pub published_time: String,
    pub uploader: String,
    pub gallery_length: i64,
    pub points: i64,
    pub preview_url: String,
    pub torrents_url: String,
    pub gallery_url: String,
}

impl GallerySummary {
    /// Reject rows that would store a garbled gallery.
    pub fn validate(&self) -> Result<()> {
        if self.gallery_id <= 0 {
            return Err(AppError::validation(format!(
                "gallery_id must be positive, got {}",
                self.gallery_id
            )));
        }
        if self.gallery_name.trim().is_empty() {
            return Err(AppError::validation(format!(
                "gallery {} has an empty name",
                self.gallery_id
            )));
        }
        Ok(())
    }
}

/// Attributes extracted from a gallery detail page.
///
/// Every field is optional; `None` leaves the stored column untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GalleryDetails {
    pub tags: Option<String>,
    pub gallery_type: Option<String>,
    pub published_time: Option<String>,
    pub uploader: Option<String>,
    pub gallery_length: Option<i64>,
    pub torrents_url: Option<String>,
    pub preview_url: Option<String>,
}

impl GalleryDetails {
    /// Schema check before anything is merged into storage.
    pub fn validate(&self) -> Result<()> {
        let non_empty = [
            ("tags", &self.tags),
            ("gallery_type", &self.gallery_type),
            ("uploader", &self.uploader),
        ];
        for (field, value) in non_empty {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(AppError::validation(format!("{field} is empty")));
            }
        }

        if let Some(date) = &self.published_time {
            if !is_iso_date(date) {
                return Err(AppError::validation(format!(
                    "published_time '{date}' is not YYYY-MM-DD"
                )));
            }
        }

        if let Some(length) = self.gallery_length {
            if length <= 0 {
                return Err(AppError::validation(format!(
                    "gallery_length must be positive, got {length}"
                )));
            }
        }

        for (field, value) in [
            ("torrents_url", &self.torrents_url),
            ("preview_url", &self.preview_url),
        ] {
            if let Some(raw) = value {
                url::Url::parse(raw)
                    .map_err(|e| AppError::validation(format!("{field} '{raw}': {e}")))?;
            }
        }

        Ok(())
    }
}

/// A stored gallery selected for refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleGallery {
    pub gallery_id: i64,
    pub gallery_url: String,
    pub updated_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_details() -> GalleryDetails {
        GalleryDetails {
            tags: Some("l:chinese, f:glasses".into()),
            gallery_type: Some("Manga".into()),
            published_time: Some("2024-03-09".into()),
            uploader: Some("someone".into()),
            gallery_length: Some(345),
            torrents_url: Some("https://e-hentai.org/gallerytorrents.php?gid=1&t=ab".into()),
            preview_url: Some("https://ehgt.org/w/01/370/52871-unblcotr.webp".into()),
        }
    }

    #[test]
    fn test_valid_details_pass() {
        assert!(valid_details().validate().is_ok());
        assert!(GalleryDetails::default().validate().is_ok());
    }

    #[test]
    fn test_details_reject_bad_values() {
        let mut details = valid_details();
        details.gallery_length = Some(0);
        assert!(details.validate().is_err());

        let mut details = valid_details();
        details.preview_url = Some("not a url".into());
        assert!(details.validate().is_err());

        let mut details = valid_details();
        details.published_time = Some("2024-02-30".into());
        assert!(details.validate().is_err());

        let mut details = valid_details();
        details.uploader = Some("  ".into());
        assert!(details.validate().is_err());
    }

    #[test]
    fn test_summary_requires_id_and_name() {
        let summary = GallerySummary {
            gallery_id: 0,
            gallery_name: "x".into(),
            ..Default::default()
        };
        assert!(summary.validate().is_err());

        let summary = GallerySummary {
            gallery_id: 7,
            gallery_name: "".into(),
            ..Default::default()
        };
        assert!(summary.validate().is_err());
    }
}
