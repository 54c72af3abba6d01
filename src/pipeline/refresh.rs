//! Incremental gallery refresh.
//!
//! Selects galleries never enriched or enriched before the staleness
//! threshold, oldest first, bounded per run, and walks them one at a time
//! with the item delay in between. The delay keeps the request rate under
//! the source's ban threshold; do not parallelize this loop.

use chrono::Utc;
use serde::Serialize;

use super::CrawlContext;
use crate::error::{AppError, Result};
use crate::models::{GalleryDetails, StaleGallery};
use crate::parsing::parse_gallery_details;
use crate::parsing::tags::{split_tags, translate_tags};
use crate::storage::{Statement, get_chunked, with_retry};
use crate::utils::{DATE_FORMAT, days_before, log};

/// Counters for one refresh run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub eligible: u64,
    pub selected: usize,
    pub enriched: usize,
    pub gone: usize,
    pub invalid: usize,
    pub failed: usize,
}

/// What happened to one gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Enriched,
    Gone,
    Invalid,
}

pub async fn run_gallery_refresh(ctx: &CrawlContext) -> Result<RefreshReport> {
    let today = Utc::now().date_naive();
    let today_str = today.format(DATE_FORMAT).to_string();
    let threshold = days_before(today, ctx.config.refresh.stale_after_days)?;

    log::header("Gallery refresh");
    let relational = ctx.relational.as_ref();
    let eligible = with_retry(&ctx.retry, "count stale", || relational.count_stale(&threshold)).await?;
    ::log::info!("Total galleries needing update: {eligible}");

    let batch_size = ctx.config.refresh.batch_size;
    let galleries = with_retry(&ctx.retry, "select stale", || {
        relational.select_stale(&threshold, batch_size)
    })
    .await?;

    let mut report = RefreshReport {
        eligible,
        selected: galleries.len(),
        ..Default::default()
    };
    if galleries.is_empty() {
        ::log::info!("No galleries found needing update");
        return Ok(report);
    }

    for (index, gallery) in galleries.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(ctx.config.crawler.item_delay()).await;
        }
        log::step(
            index + 1,
            galleries.len(),
            &format!("gallery {} {}", gallery.gallery_id, gallery.gallery_url),
        );

        match refresh_one(ctx, gallery, &today_str).await {
            Ok(ItemOutcome::Enriched) => report.enriched += 1,
            Ok(ItemOutcome::Gone) => report.gone += 1,
            Ok(ItemOutcome::Invalid) => report.invalid += 1,
            Err(e) if e.is_run_level() => {
                ::log::warn!("Gallery refresh stopped at {}: {e}", gallery.gallery_id);
                return Err(e);
            }
            Err(e) => {
                report.failed += 1;
                ::log::error!("Error processing gallery {}: {e}", gallery.gallery_id);
            }
        }
    }

    log::summary(
        "Gallery refresh",
        &[
            ("eligible", report.eligible.to_string()),
            ("selected", report.selected.to_string()),
            ("enriched", report.enriched.to_string()),
            ("gone", report.gone.to_string()),
            ("invalid", report.invalid.to_string()),
            ("failed", report.failed.to_string()),
        ],
    );
    Ok(report)
}

async fn refresh_one(ctx: &CrawlContext, gallery: &StaleGallery, today: &str) -> Result<ItemOutcome> {
    let body = match ctx.fetch_source_page(&gallery.gallery_url).await {
        Ok(body) => body,
        Err(AppError::Gone(reason)) => {
            ::log::warn!("Gallery {} is gone ({reason}); stamping to skip future checks", gallery.gallery_id);
            stamp(ctx, gallery.gallery_id, today).await?;
            return Ok(ItemOutcome::Gone);
        }
        Err(e) => return Err(e),
    };

    let details = parse_gallery_details(&body, gallery.gallery_id)?;
    if let Err(e) = details.validate() {
        ::log::warn!("Invalid gallery details for gallery {}: {e}", gallery.gallery_id);
        stamp(ctx, gallery.gallery_id, today).await?;
        return Ok(ItemOutcome::Invalid);
    }

    let tags_zh = localize_tags(ctx, &details).await?;
    let statement = Statement::EnrichGallery {
        gallery_id: gallery.gallery_id,
        details,
        tags_zh,
        updated_at: today.to_string(),
    };
    write(ctx, statement).await?;
    Ok(ItemOutcome::Enriched)
}

/// `tags_zh` from the translation store; `None` when the page had no tags.
async fn localize_tags(ctx: &CrawlContext, details: &GalleryDetails) -> Result<Option<String>> {
    let Some(tags) = details.tags.as_deref() else {
        return Ok(None);
    };
    let keys = split_tags(tags);
    let translations = get_chunked(ctx.kv.as_ref(), &keys, &ctx.retry).await?;
    Ok(Some(translate_tags(tags, &translations)))
}

async fn stamp(ctx: &CrawlContext, gallery_id: i64, today: &str) -> Result<()> {
    write(
        ctx,
        Statement::StampGallery {
            gallery_id,
            updated_at: today.to_string(),
        },
    )
    .await
}

async fn write(ctx: &CrawlContext, statement: Statement) -> Result<()> {
    let batch = [statement];
    let relational = ctx.relational.as_ref();
    with_retry(&ctx.retry, "gallery update", || relational.execute_batch(&batch)).await?;
    Ok(())
}
