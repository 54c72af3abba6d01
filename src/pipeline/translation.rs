//! Tag translation sync.
//!
//! Pulls the latest release of the translation database, flattens it to
//! `ns:tag` → localized name, drops ambiguous keys, and replaces the
//! key-value store's contents with the rest.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::CrawlContext;
use crate::error::{AppError, Result};
use crate::models::{ReleaseManifest, TagDatabase};
use crate::parsing::abbreviate_namespace;
use crate::storage::{diff_write, with_retry};
use crate::utils::log;

/// `sync_state` key holding the digest of the last applied asset.
pub const DIGEST_STATE_KEY: &str = "translation.asset_sha256";

/// Counters for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranslationReport {
    pub release: Option<String>,
    pub digest: String,
    /// Asset identical to the last applied one; nothing parsed
    pub unchanged: bool,
    pub entries: usize,
    pub conflicts: usize,
    pub written: usize,
    pub write_calls: usize,
    /// Stored keys deleted because they are conflicted or left the feed
    pub removed: usize,
}

/// Flattened translation set after conflict removal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationSet {
    pub entries: BTreeMap<String, String>,
    /// Keys dropped because sources disagreed on their value
    pub conflicts: Vec<String>,
}

/// Flatten the feed into `ns:tag` → name.
///
/// A key offered with two different values is excluded entirely; neither
/// value survives. Repeats of the same value are fine.
pub fn build_translation_set(database: &TagDatabase, excluded: &[String]) -> TranslationSet {
    let mut candidates: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for block in &database.data {
        if excluded.iter().any(|ns| ns == &block.namespace) {
            continue;
        }
        let prefix = abbreviate_namespace(&block.namespace);
        for (tag, record) in &block.data {
            candidates
                .entry(format!("{prefix}:{tag}"))
                .or_default()
                .insert(record.name.clone());
        }
    }

    let mut set = TranslationSet::default();
    for (key, values) in candidates {
        if values.len() > 1 {
            set.conflicts.push(key);
            continue;
        }
        if let Some(value) = values.into_iter().next() {
            set.entries.insert(key, value);
        }
    }
    set
}

/// Sync the feed. With `force`, an unchanged asset is still re-applied.
pub async fn run_translation_sync(ctx: &CrawlContext, force: bool) -> Result<TranslationReport> {
    let config = &ctx.config.translation;
    log::header("Tag translation sync");

    log::step(1, 4, "Fetching release manifest");
    let manifest: ReleaseManifest = serde_json::from_str(&fetch_text(ctx, &config.release_url).await?)?;
    let asset = manifest.asset(&config.asset_name).ok_or_else(|| {
        AppError::validation(format!(
            "release has no asset named {}",
            config.asset_name
        ))
    })?;

    log::step(2, 4, &format!("Downloading {}", asset.name));
    let body = fetch_text(ctx, &asset.browser_download_url).await?;
    let digest = hex::encode(Sha256::digest(body.as_bytes()));

    let mut report = TranslationReport {
        release: manifest.tag_name.clone(),
        digest: digest.clone(),
        ..Default::default()
    };

    let relational = ctx.relational.as_ref();
    let previous = with_retry(&ctx.retry, "read sync state", || relational.get_state(DIGEST_STATE_KEY)).await?;
    if !force && previous.as_deref() == Some(digest.as_str()) {
        ::log::info!("Translation asset unchanged ({digest}); skipping");
        report.unchanged = true;
        return Ok(report);
    }

    log::step(3, 4, "Building translation set");
    let database: TagDatabase = serde_json::from_str(&body)?;
    let set = build_translation_set(&database, &config.excluded_namespaces);
    if !set.conflicts.is_empty() {
        ::log::warn!(
            "Dropped {} conflicting keys: {}",
            set.conflicts.len(),
            set.conflicts.join(", ")
        );
    }
    report.entries = set.entries.len();
    report.conflicts = set.conflicts.len();

    log::step(4, 4, "Writing changed entries");
    let diff = diff_write(ctx.kv.as_ref(), &set.entries, &ctx.retry).await?;
    report.written = diff.changed;
    report.write_calls = diff.write_calls;
    report.removed = diff.removed;

    with_retry(&ctx.retry, "write sync state", || relational.set_state(DIGEST_STATE_KEY, &digest)).await?;

    log::summary(
        "Tag translation sync",
        &[
            ("release", report.release.clone().unwrap_or_else(|| "-".into())),
            ("entries", report.entries.to_string()),
            ("conflicts", report.conflicts.to_string()),
            ("written", report.written.to_string()),
            ("removed", report.removed.to_string()),
        ],
    );
    Ok(report)
}

async fn fetch_text(ctx: &CrawlContext, url: &str) -> Result<String> {
    let response = ctx.fetcher.fetch(url).await?;
    if !response.is_success() {
        return Err(AppError::Status {
            status: response.status,
            url: response.url,
        });
    }
    Ok(response.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::context;
    use crate::storage::KvStore;

    const RELEASE_URL: &str = "https://api.github.com/repos/EhTagTranslation/Database/releases/latest";
    const ASSET_URL: &str = "https://github.com/EhTagTranslation/Database/releases/download/v6/db.text.json";

    fn manifest() -> String {
        format!(
            r#"{{"tag_name": "v6", "assets": [
                {{"name": "db.html.json", "browser_download_url": "https://example.org/h"}},
                {{"name": "db.text.json", "browser_download_url": "{ASSET_URL}"}}
            ]}}"#
        )
    }

    const ASSET: &str = r#"{
      "data": [
        {"namespace": "rows", "data": {"female": {"name": "女性"}}},
        {"namespace": "female", "data": {
            "glasses": {"name": "眼镜"},
            "lolicon": {"name": "萝莉"}
        }},
        {"namespace": "language", "data": {"chinese": {"name": "汉语"}}},
        {"namespace": "f", "data": {"lolicon": {"name": "幼女"}, "glasses": {"name": "眼镜"}}},
        {"namespace": "custom", "data": {"thing": {"name": "东西"}}}
      ]
    }"#;

    fn database(json: &str) -> TagDatabase {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_conflicting_key_is_dropped_entirely() {
        let set = build_translation_set(&database(ASSET), &["rows".to_string()]);
        assert_eq!(set.conflicts, vec!["f:lolicon"]);
        assert!(!set.entries.contains_key("f:lolicon"));
        assert_eq!(set.entries["f:glasses"], "眼镜");
        assert_eq!(set.entries["l:chinese"], "汉语");
        assert_eq!(set.entries["custom:thing"], "东西");
        assert!(!set.entries.contains_key("rows:female"));
        assert_eq!(set.entries.len(), 3);
    }

    #[tokio::test]
    async fn test_sync_writes_then_skips_unchanged_asset() {
        let (ctx, fetcher, store) = context();
        fetcher.respond(RELEASE_URL, 200, &manifest());
        fetcher.respond(ASSET_URL, 200, ASSET);

        let first = run_translation_sync(&ctx, false).await.unwrap();
        assert_eq!(first.release.as_deref(), Some("v6"));
        assert_eq!(first.entries, 3);
        assert_eq!(first.conflicts, 1);
        assert_eq!(first.written, 3);
        let stored = store.get_many(&["f:glasses".into()]).await.unwrap();
        assert_eq!(stored["f:glasses"], "眼镜");

        let second = run_translation_sync(&ctx, false).await.unwrap();
        assert!(second.unchanged);
        assert_eq!(second.written, 0);

        let forced = run_translation_sync(&ctx, true).await.unwrap();
        assert!(!forced.unchanged);
        assert_eq!(forced.written, 0);
        assert_eq!(forced.write_calls, 0);
    }

    #[tokio::test]
    async fn test_conflicted_key_is_removed_from_store() {
        let (ctx, fetcher, store) = context();
        store
            .put_many(&[
                ("f:lolicon".into(), "萝莉".into()),
                ("m:retired".into(), "旧".into()),
            ])
            .await
            .unwrap();
        fetcher.respond(RELEASE_URL, 200, &manifest());
        fetcher.respond(ASSET_URL, 200, ASSET);

        let report = run_translation_sync(&ctx, false).await.unwrap();
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.removed, 2);

        let stored = store
            .get_many(&["f:lolicon".into(), "m:retired".into(), "f:glasses".into()])
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored["f:glasses"], "眼镜");
    }

    #[tokio::test]
    async fn test_missing_asset_is_an_error() {
        let (ctx, fetcher, _store) = context();
        fetcher.respond(RELEASE_URL, 200, r#"{"assets": []}"#);
        assert!(matches!(
            run_translation_sync(&ctx, false).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_manifest_http_error() {
        let (ctx, fetcher, _store) = context();
        fetcher.respond(RELEASE_URL, 403, "rate limited");
        assert!(matches!(
            run_translation_sync(&ctx, false).await,
            Err(AppError::Status { status: 403, .. })
        ));
    }
}
