//! Toplist crawl job.
//!
//! Fetches every period's listing pages strictly one at a time with the task
//! delay between them, then writes galleries (conditional upsert) and rank
//! entries (insert-or-ignore) in ceiling-sized batches.

use serde::Serialize;

use super::CrawlContext;
use crate::error::Result;
use crate::models::{ToplistExtract, ToplistPage};
use crate::parsing::parse_toplist;
use crate::storage::{Statement, execute_chunked};
use crate::utils::{log, today_utc};

/// Counters for one toplist run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToplistReport {
    pub list_date: String,
    pub pages: usize,
    pub failed_pages: usize,
    pub galleries: usize,
    pub rank_entries: usize,
}

/// Crawl today's lists.
pub async fn run_toplist_crawl(ctx: &CrawlContext) -> Result<ToplistReport> {
    run_toplist_crawl_on(ctx, &today_utc()).await
}

/// Crawl the current lists, recording them under `list_date`.
///
/// Page-level failures are logged and the next page is tried; ban, abort
/// and configuration errors stop the run.
pub async fn run_toplist_crawl_on(ctx: &CrawlContext, list_date: &str) -> Result<ToplistReport> {
    let config = &ctx.config;
    let plan = ToplistPage::plan(&config.source.base_url, config.crawler.pages_per_period);

    log::header("Toplist crawl");
    let mut report = ToplistReport {
        list_date: list_date.to_string(),
        pages: plan.len(),
        ..Default::default()
    };

    for (index, page) in plan.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(config.crawler.task_delay()).await;
        }
        log::step(
            index + 1,
            plan.len(),
            &format!("{} page {}", page.period_type, page.page + 1),
        );

        match crawl_page(ctx, page, list_date).await {
            Ok((galleries, ranks)) => {
                report.galleries += galleries;
                report.rank_entries += ranks;
            }
            Err(e) if e.is_run_level() => {
                ::log::warn!("Toplist crawl stopped at {}: {e}", page.url);
                return Err(e);
            }
            Err(e) => {
                report.failed_pages += 1;
                ::log::error!("Error crawling toplist page {}: {e}", page.url);
            }
        }
    }

    log::summary(
        "Toplist crawl",
        &[
            ("list_date", report.list_date.clone()),
            ("pages", report.pages.to_string()),
            ("failed_pages", report.failed_pages.to_string()),
            ("galleries", report.galleries.to_string()),
            ("rank_entries", report.rank_entries.to_string()),
        ],
    );
    Ok(report)
}

async fn crawl_page(
    ctx: &CrawlContext,
    page: &ToplistPage,
    list_date: &str,
) -> Result<(usize, usize)> {
    let body = ctx.fetch_source_page(&page.url).await?;
    let extract = parse_toplist(
        &body,
        page.period_type,
        Some(list_date),
        &ctx.config.source.base_url,
    )?;
    log::sub_item(&format!(
        "parsed {} rows from {}",
        extract.rank_entries.len(),
        page.url
    ));
    persist_extract(ctx, extract).await
}

/// Write one page's galleries, then its rank entries. Returns how many of
/// each were persisted.
///
/// A failed gallery batch does not prevent the rank batch; rank rows carry
/// no foreign key.
pub async fn persist_extract(ctx: &CrawlContext, extract: ToplistExtract) -> Result<(usize, usize)> {
    if extract.galleries.is_empty() && extract.rank_entries.is_empty() {
        ::log::info!("No data to persist; skipping database writes");
        return Ok((0, 0));
    }

    let galleries: Vec<Statement> = extract
        .galleries
        .into_iter()
        .map(Statement::UpsertGallery)
        .collect();
    let gallery_count = match execute_chunked(ctx.relational.as_ref(), &galleries, &ctx.retry, "gallery upsert").await {
        Ok(_) => galleries.len(),
        Err(e) if e.is_run_level() => return Err(e),
        Err(e) => {
            ::log::error!("Failed to batch upsert {} galleries: {e}", galleries.len());
            0
        }
    };

    let ranks: Vec<Statement> = extract
        .rank_entries
        .into_iter()
        .map(Statement::InsertRank)
        .collect();
    let rank_count = ranks.len();
    execute_chunked(ctx.relational.as_ref(), &ranks, &ctx.retry, "rank insert").await?;

    Ok((gallery_count, rank_count))
}
