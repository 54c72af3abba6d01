//! Trigger dispatch and run-level recovery.
//!
//! A temporary ban re-enqueues the same trigger after the cool-down. An
//! abort stops the run with no reschedule. Configuration errors propagate.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use super::{
    CrawlContext, RefreshReport, ToplistReport, TranslationReport, run_gallery_refresh,
    run_toplist_crawl, run_translation_sync,
};
use crate::error::{AppError, Result};
use crate::models::CrawlTrigger;

/// Per-invocation switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Re-apply the translation asset even when its digest is unchanged
    pub force_translation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "job", rename_all = "kebab-case")]
pub enum JobReport {
    CrawlToplists(ToplistReport),
    UpdateGallery(RefreshReport),
    CrawlTagsTranslation(TranslationReport),
}

/// How a triggered run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RunOutcome {
    Completed { report: JobReport },
    /// Banned; the same trigger was queued again
    Rescheduled { trigger: CrawlTrigger, delay_secs: u64 },
    /// Structural block; needs operator attention
    Aborted { reason: String },
}

/// Run the job behind `trigger` and apply the run-level recovery policy.
pub async fn run_trigger(
    ctx: &CrawlContext,
    trigger: CrawlTrigger,
    options: RunOptions,
) -> Result<RunOutcome> {
    ::log::info!("Running {trigger}");
    let result = match trigger {
        CrawlTrigger::CrawlToplists => run_toplist_crawl(ctx).await.map(JobReport::CrawlToplists),
        CrawlTrigger::UpdateGallery => run_gallery_refresh(ctx).await.map(JobReport::UpdateGallery),
        CrawlTrigger::CrawlTagsTranslation => run_translation_sync(ctx, options.force_translation)
            .await
            .map(JobReport::CrawlTagsTranslation),
    };

    match result {
        Ok(report) => Ok(RunOutcome::Completed { report }),
        Err(AppError::TemporaryBan { message, context }) => {
            let delay = ctx.config.crawler.ban_cooldown();
            ::log::warn!(
                "{trigger} hit a temporary ban ({message}); retrying in {}s. Context: {context:?}",
                delay.as_secs()
            );
            ctx.queue.enqueue(trigger.message(), delay).await?;
            Ok(RunOutcome::Rescheduled {
                trigger,
                delay_secs: delay.as_secs(),
            })
        }
        Err(AppError::Abort { message, context }) => {
            ::log::warn!("{trigger} aborted: {message}. Context: {context:?}");
            Ok(RunOutcome::Aborted { reason: message })
        }
        Err(e) => Err(e),
    }
}

/// Handle one raw queue message. Unknown payloads are discarded.
pub async fn handle_message(
    ctx: &CrawlContext,
    message: &str,
    options: RunOptions,
) -> Result<Option<RunOutcome>> {
    match message.parse::<CrawlTrigger>() {
        Ok(trigger) => run_trigger(ctx, trigger, options).await.map(Some),
        Err(_) => {
            ::log::warn!("Discarding unexpected queue message: {message:?}");
            Ok(None)
        }
    }
}

/// Run every due trigger, oldest first.
///
/// Each message is leased for `storage.queue_lease_secs` and acknowledged
/// only after it was handled. A failing job is logged and left unacknowledged,
/// so it is redelivered once the lease runs out; configuration errors stop
/// the drain.
pub async fn drain_queue(ctx: &CrawlContext, options: RunOptions) -> Result<Vec<RunOutcome>> {
    let leased = ctx
        .queue
        .lease_due(Utc::now(), ctx.config.storage.queue_lease())
        .await?;
    ::log::info!("{} due trigger(s)", leased.len());

    let mut outcomes = Vec::new();
    for trigger in leased {
        match handle_message(ctx, &trigger.message, options).await {
            Ok(outcome) => {
                ctx.queue.ack(trigger.id).await?;
                outcomes.extend(outcome);
            }
            Err(e @ AppError::Config(_)) => return Err(e),
            Err(e) => ::log::error!(
                "Trigger {} failed, will be redelivered: {e}",
                trigger.message
            ),
        }
    }
    Ok(outcomes)
}

/// Queue `trigger` to run after `delay`.
pub async fn schedule(ctx: &CrawlContext, trigger: CrawlTrigger, delay: Duration) -> Result<()> {
    ctx.queue.enqueue(trigger.message(), delay).await?;
    ::log::info!("Queued {trigger} to run in {}s", delay.as_secs());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToplistPage;
    use crate::pipeline::testing::context;
    use crate::storage::{QueuedTrigger, TriggerQueue};

    const LEASE: Duration = Duration::from_secs(900);

    fn messages(leased: Vec<QueuedTrigger>) -> Vec<String> {
        leased.into_iter().map(|t| t.message).collect()
    }

    const BANNED: &str = "This IP address has been temporarily banned due to an excessive request rate.";
    const TRACE_URL: &str = "https://cloudflare.com/cdn-cgi/trace";

    #[tokio::test]
    async fn test_ban_reschedules_same_trigger() {
        let (ctx, fetcher, store) = context();
        let plan = ToplistPage::plan("https://e-hentai.org", 4);
        fetcher.respond(&plan[0].url, 200, BANNED);

        let outcome = run_trigger(&ctx, CrawlTrigger::CrawlToplists, RunOptions::default())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Rescheduled {
                trigger: CrawlTrigger::CrawlToplists,
                delay_secs: 3600
            }
        );
        assert_eq!(fetcher.requests().len(), 1);

        assert!(store.lease_due(Utc::now(), LEASE).await.unwrap().is_empty());
        let later = Utc::now() + chrono::Duration::seconds(3601);
        assert_eq!(messages(store.lease_due(later, LEASE).await.unwrap()), vec!["crawl-toplists"]);
    }

    #[tokio::test]
    async fn test_abort_does_not_reschedule() {
        let (ctx, fetcher, store) = context();
        let plan = ToplistPage::plan("https://e-hentai.org", 4);
        fetcher.respond(&plan[0].url, 451, "Unavailable For Legal Reasons");
        fetcher.respond(TRACE_URL, 200, "colo=LHR\nloc=GB\n");

        let outcome = run_trigger(&ctx, CrawlTrigger::CrawlToplists, RunOptions::default())
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Aborted { .. }));
        // page, then trace; nothing after
        assert_eq!(fetcher.requests().len(), 2);

        let far = Utc::now() + chrono::Duration::days(2);
        assert!(store.lease_due(far, LEASE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_message_is_discarded() {
        let (ctx, fetcher, _store) = context();
        let outcome = handle_message(&ctx, "crawl-everything", RunOptions::default())
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_drain_runs_due_triggers() {
        let (ctx, _fetcher, store) = context();
        store.enqueue("update-gallery", Duration::ZERO).await.unwrap();
        store.enqueue("bogus", Duration::ZERO).await.unwrap();
        schedule(&ctx, CrawlTrigger::CrawlToplists, Duration::from_secs(600))
            .await
            .unwrap();

        let outcomes = drain_queue(&ctx, RunOptions::default()).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            &outcomes[0],
            RunOutcome::Completed {
                report: JobReport::UpdateGallery(RefreshReport { selected: 0, .. })
            }
        ));

        // handled messages are acknowledged; the delayed trigger stays queued
        let later = Utc::now() + chrono::Duration::seconds(601);
        assert_eq!(messages(store.lease_due(later, LEASE).await.unwrap()), vec!["crawl-toplists"]);
        let past_lease = Utc::now() + chrono::Duration::hours(2);
        assert!(store.lease_due(past_lease, LEASE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_job_is_redelivered_after_lease() {
        let (ctx, fetcher, store) = context();
        fetcher.respond(
            &ctx.config.translation.release_url,
            403,
            "rate limited",
        );
        store
            .enqueue("crawl-tags-translation", Duration::ZERO)
            .await
            .unwrap();

        let outcomes = drain_queue(&ctx, RunOptions::default()).await.unwrap();
        assert!(outcomes.is_empty());

        // hidden while leased, visible again afterwards
        assert!(drain_queue(&ctx, RunOptions::default()).await.unwrap().is_empty());
        assert_eq!(fetcher.requests().len(), 1);
        let expired = Utc::now() + chrono::Duration::seconds(901);
        assert_eq!(
            messages(store.lease_due(expired, LEASE).await.unwrap()),
            vec!["crawl-tags-translation"]
        );
    }

    #[test]
    fn test_outcome_serializes_with_tags() {
        let outcome = RunOutcome::Rescheduled {
            trigger: CrawlTrigger::UpdateGallery,
            delay_secs: 3600,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "rescheduled");
        assert_eq!(json["trigger"], "update-gallery");
    }
}
