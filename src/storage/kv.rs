//! Key-value diff-write.
//!
//! A full resync of tens of thousands of entries becomes a minimal delta:
//! current values are read in chunks no larger than the read ceiling, and
//! only new or changed pairs are written, in chunks no larger than the
//! write ceiling. Stored keys absent from the desired set are deleted, so
//! after a sync the store holds exactly that set.

use std::collections::{BTreeMap, HashMap};

use crate::error::Result;
use crate::storage::{KvStore, RetryPolicy, with_retry};

/// Outcome of one diff-write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    pub total: usize,
    pub changed: usize,
    pub read_calls: usize,
    pub write_calls: usize,
    pub removed: usize,
    pub delete_calls: usize,
}

/// Read `keys` in chunks no larger than the store's read ceiling.
pub async fn get_chunked(
    store: &dyn KvStore,
    keys: &[String],
    policy: &RetryPolicy,
) -> Result<HashMap<String, String>> {
    let mut found = HashMap::with_capacity(keys.len());
    for chunk in keys.chunks(store.read_limit().max(1)) {
        let values = with_retry(policy, "kv read", || store.get_many(chunk)).await?;
        found.extend(values);
    }
    Ok(found)
}

/// Make the store hold exactly `desired`, touching only what differs.
pub async fn diff_write(
    store: &dyn KvStore,
    desired: &BTreeMap<String, String>,
    policy: &RetryPolicy,
) -> Result<DiffReport> {
    let keys: Vec<String> = desired.keys().cloned().collect();
    let read_limit = store.read_limit().max(1);
    let current = get_chunked(store, &keys, policy).await?;

    let changed: Vec<(String, String)> = desired
        .iter()
        .filter(|(key, value)| current.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let mut report = DiffReport {
        total: desired.len(),
        changed: changed.len(),
        read_calls: keys.len().div_ceil(read_limit),
        ..Default::default()
    };

    let write_limit = store.write_limit().max(1);
    for chunk in changed.chunks(write_limit) {
        with_retry(policy, "kv write", || store.put_many(chunk)).await?;
        report.write_calls += 1;
    }

    let stale = stored_keys_outside(store, desired, policy).await?;
    report.removed = stale.len();
    for chunk in stale.chunks(write_limit) {
        with_retry(policy, "kv delete", || store.delete_many(chunk)).await?;
        report.delete_calls += 1;
    }

    Ok(report)
}

/// Every stored key not in `desired`, paged by the read ceiling.
async fn stored_keys_outside(
    store: &dyn KvStore,
    desired: &BTreeMap<String, String>,
    policy: &RetryPolicy,
) -> Result<Vec<String>> {
    let page_size = store.read_limit().max(1);
    let mut stale = Vec::new();
    let mut after: Option<String> = None;
    loop {
        let page = with_retry(policy, "kv list", || {
            store.list_keys(after.as_deref(), page_size)
        })
        .await?;
        let full = page.len() == page_size;
        let last = page.last().cloned();
        stale.extend(page.into_iter().filter(|key| !desired.contains_key(key)));
        match last {
            Some(key) if full => after = Some(key),
            _ => break,
        }
    }
    Ok(stale)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// In-memory store that records the size of every call.
    struct RecordingKv {
        read_limit: usize,
        write_limit: usize,
        data: Mutex<HashMap<String, String>>,
        reads: Mutex<Vec<usize>>,
        writes: Mutex<Vec<usize>>,
        deletes: Mutex<Vec<usize>>,
    }

    impl RecordingKv {
        fn new(read_limit: usize, write_limit: usize) -> Self {
            Self {
                read_limit,
                write_limit,
                data: Mutex::new(HashMap::new()),
                reads: Mutex::new(Vec::new()),
                writes: Mutex::new(Vec::new()),
                deletes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl KvStore for RecordingKv {
        fn read_limit(&self) -> usize {
            self.read_limit
        }

        fn write_limit(&self) -> usize {
            self.write_limit
        }

        async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, String>> {
            self.reads.lock().unwrap().push(keys.len());
            let data = self.data.lock().unwrap();
            Ok(keys
                .iter()
                .filter_map(|k| data.get(k).map(|v| (k.clone(), v.clone())))
                .collect())
        }

        async fn put_many(&self, pairs: &[(String, String)]) -> Result<()> {
            self.writes.lock().unwrap().push(pairs.len());
            self.data.lock().unwrap().extend(pairs.iter().cloned());
            Ok(())
        }

        async fn list_keys(&self, after: Option<&str>, limit: usize) -> Result<Vec<String>> {
            assert!(limit <= self.read_limit);
            let mut keys: Vec<String> = self
                .data
                .lock()
                .unwrap()
                .keys()
                .filter(|k| after.is_none_or(|a| k.as_str() > a))
                .cloned()
                .collect();
            keys.sort();
            keys.truncate(limit);
            Ok(keys)
        }

        async fn delete_many(&self, keys: &[String]) -> Result<()> {
            self.deletes.lock().unwrap().push(keys.len());
            let mut data = self.data.lock().unwrap();
            for key in keys {
                data.remove(key);
            }
            Ok(())
        }
    }

    fn entries(n: usize, suffix: &str) -> BTreeMap<String, String> {
        (0..n)
            .map(|i| (format!("f:tag{i}"), format!("译{i}{suffix}")))
            .collect()
    }

    #[tokio::test]
    async fn test_identical_state_writes_nothing() {
        let store = RecordingKv::new(100, 10_000);
        let desired = entries(250, "");
        diff_write(&store, &desired, &RetryPolicy::default()).await.unwrap();
        store.writes.lock().unwrap().clear();

        let report = diff_write(&store, &desired, &RetryPolicy::default()).await.unwrap();
        assert_eq!(report.changed, 0);
        assert_eq!(report.write_calls, 0);
        assert!(store.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_calls_respect_ceilings() {
        let store = RecordingKv::new(7, 10);
        let report = diff_write(&store, &entries(45, ""), &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(report.changed, 45);
        assert_eq!(report.write_calls, 5);
        assert_eq!(report.read_calls, 7);
        assert!(store.reads.lock().unwrap().iter().all(|&n| n <= 7));
        assert!(store.writes.lock().unwrap().iter().all(|&n| n <= 10));
    }

    #[tokio::test]
    async fn test_only_changed_pairs_are_written() {
        let store = RecordingKv::new(100, 100);
        diff_write(&store, &entries(20, ""), &RetryPolicy::default()).await.unwrap();
        store.writes.lock().unwrap().clear();

        let mut desired = entries(20, "");
        desired.insert("f:tag3".into(), "changed".into());
        desired.insert("m:new".into(), "新".into());
        let report = diff_write(&store, &desired, &RetryPolicy::default()).await.unwrap();

        assert_eq!(report.changed, 2);
        assert_eq!(*store.writes.lock().unwrap(), vec![2]);
        assert_eq!(
            store.data.lock().unwrap().get("f:tag3").map(String::as_str),
            Some("changed")
        );
    }

    #[tokio::test]
    async fn test_keys_missing_from_desired_are_removed() {
        let store = RecordingKv::new(4, 3);
        diff_write(&store, &entries(10, ""), &RetryPolicy::default()).await.unwrap();

        let mut desired = entries(10, "");
        for i in 0..7 {
            desired.remove(&format!("f:tag{i}"));
        }
        let report = diff_write(&store, &desired, &RetryPolicy::default()).await.unwrap();

        assert_eq!(report.changed, 0);
        assert_eq!(report.removed, 7);
        assert_eq!(report.delete_calls, 3);
        assert!(store.deletes.lock().unwrap().iter().all(|&n| n <= 3));
        let mut left: Vec<String> = store.data.lock().unwrap().keys().cloned().collect();
        left.sort();
        assert_eq!(left, vec!["f:tag7", "f:tag8", "f:tag9"]);
    }
}
