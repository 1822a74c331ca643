use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::RwLock;

use crate::store::{CreateOutcome, KvStore};

/// Single-process store backing one trade-tracking instance. A `BTreeMap`
/// behind one lock gives linearizable semantics; the compound operations
/// hold the write lock across their whole read-then-write sequence, which
/// is the atomicity the trade and duplicate invariants rely on.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn scan_prefix(records: &BTreeMap<String, Value>, prefix: &str) -> Vec<(String, Value)> {
    records
        .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.records.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        let records = self.records.read().await;
        Ok(scan_prefix(&records, prefix))
    }

    async fn create_if_absent_matching(
        &self,
        prefix: &str,
        key: &str,
        value: Value,
        conflicts: &(dyn for<'a> Fn(&'a Value) -> bool + Send + Sync),
    ) -> Result<CreateOutcome> {
        let mut records = self.records.write().await;
        let existing = scan_prefix(&records, prefix)
            .into_iter()
            .find(|(_, v)| conflicts(v));
        if let Some((key, value)) = existing {
            return Ok(CreateOutcome::Conflict { key, value });
        }
        records.insert(key.to_string(), value);
        Ok(CreateOutcome::Created)
    }

    async fn check_and_mark(&self, key: &str, now_ms: i64, window_ms: i64) -> Result<bool> {
        let mut records = self.records.write().await;
        if let Some(last_seen) = records.get(key).and_then(Value::as_i64) {
            if now_ms - last_seen < window_ms {
                return Ok(true);
            }
        }
        records.insert(key.to_string(), Value::from(now_ms));
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_set_delete_roundtrip() {
        let store = MemoryStore::new();
        store.set("trade:1", json!({"entry": 100.0})).await.unwrap();
        assert_eq!(
            store.get("trade:1").await.unwrap(),
            Some(json!({"entry": 100.0}))
        );
        store.delete("trade:1").await.unwrap();
        assert_eq!(store.get("trade:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_is_prefix_bounded_and_ordered() {
        let store = MemoryStore::new();
        store.set("archive:2024-01-15:2", json!(2)).await.unwrap();
        store.set("archive:2024-01-15:1", json!(1)).await.unwrap();
        store.set("archive:2024-01-16:3", json!(3)).await.unwrap();
        store.set("bias:2024-01-15", json!("x")).await.unwrap();

        let hits = store.scan("archive:2024-01-15:").await.unwrap();
        let keys: Vec<&str> = hits.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["archive:2024-01-15:1", "archive:2024-01-15:2"]);
    }

    #[tokio::test]
    async fn bias_prefix_does_not_capture_sent_markers() {
        let store = MemoryStore::new();
        store.set("bias:2024-01-15", json!("pending")).await.unwrap();
        store.set("bias_sent:2024-01-15", json!(1)).await.unwrap();
        let hits = store.scan("bias:").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "bias:2024-01-15");
    }

    #[tokio::test]
    async fn create_reports_first_conflicting_record() {
        let store = MemoryStore::new();
        store
            .set("trade:5", json!({"direction": "LONG"}))
            .await
            .unwrap();

        let outcome = store
            .create_if_absent_matching("trade:", "trade:9", json!({}), &|_| true)
            .await
            .unwrap();
        match outcome {
            CreateOutcome::Conflict { key, value } => {
                assert_eq!(key, "trade:5");
                assert_eq!(value, json!({"direction": "LONG"}));
            }
            CreateOutcome::Created => panic!("expected conflict"),
        }
        assert_eq!(store.get("trade:9").await.unwrap(), None);
    }

    #[tokio::test]
    async fn create_ignores_records_the_predicate_clears() {
        let store = MemoryStore::new();
        store.set("trade:5", json!({"closed": true})).await.unwrap();

        let outcome = store
            .create_if_absent_matching("trade:", "trade:9", json!({"entry": 1.0}), &|v| {
                v.get("closed").and_then(Value::as_bool) != Some(true)
            })
            .await
            .unwrap();
        assert!(matches!(outcome, CreateOutcome::Created));
        assert!(store.get("trade:9").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn check_and_mark_respects_window() {
        let store = MemoryStore::new();
        assert!(!store.check_and_mark("signal:a", 1_000, 5_000).await.unwrap());
        // Within the window: duplicate, marker untouched.
        assert!(store.check_and_mark("signal:a", 4_000, 5_000).await.unwrap());
        assert_eq!(store.get("signal:a").await.unwrap(), Some(json!(1_000)));
        // Past the window: accepted again, marker refreshed.
        assert!(!store.check_and_mark("signal:a", 7_000, 5_000).await.unwrap());
        assert_eq!(store.get("signal:a").await.unwrap(), Some(json!(7_000)));
    }
}
