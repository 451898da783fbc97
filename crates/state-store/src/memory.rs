use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{Result, StateStoreError, store::StateStore};

/// In-memory state store implementation for testing.
///
/// Provides the same contract as the production cache: documents, atomic
/// counters, and membership sets. Counter increments take a write lock for
/// the full read-modify-write, which makes them atomic within the process.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    entries: Arc<RwLock<HashMap<String, Value>>>,
    counters: Arc<RwLock<HashMap<String, i64>>>,
    sets: Arc<RwLock<HashMap<String, BTreeSet<String>>>>,
    writes: Arc<AtomicU64>,
}

impl InMemoryStateStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of `set` calls performed since creation.
    ///
    /// Used by tests asserting that a handler performed zero store calls.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the number of documents currently stored.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Clears all documents, counters and sets.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
        self.counters.write().await.clear();
        self.sets.write().await.clear();
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if self.entries.write().await.remove(key).is_some() {
            return Ok(());
        }
        if self.counters.write().await.remove(key).is_some() {
            return Ok(());
        }
        if self.sets.write().await.remove(key).is_some() {
            return Ok(());
        }
        Err(StateStoreError::NotFound {
            key: key.to_string(),
        })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        if self.entries.read().await.contains_key(key) {
            return Ok(true);
        }
        if self.counters.read().await.contains_key(key) {
            return Ok(true);
        }
        Ok(self.sets.read().await.contains_key(key))
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        let mut counters = self.counters.write().await;
        let value = counters.entry(key.to_string()).or_insert(0);
        *value += delta;
        Ok(*value)
    }

    async fn counter(&self, key: &str) -> Result<i64> {
        Ok(self.counters.read().await.get(key).copied().unwrap_or(0))
    }

    async fn add_set_member(&self, key: &str, member: &str) -> Result<()> {
        self.sets
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .read()
            .await
            .get(key)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let store = InMemoryStateStore::new();
        let doc = json!({"id": "abc", "state": "RECEIVED", "counts": [1, 2, 3]});

        store.set("bulk:abc", doc.clone()).await.unwrap();

        let loaded = store.get("bulk:abc").await.unwrap();
        assert_eq!(loaded, Some(doc));
    }

    #[tokio::test]
    async fn get_absent_key_returns_none() {
        let store = InMemoryStateStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_overwrites_existing_document() {
        let store = InMemoryStateStore::new();
        store.set("k", json!({"v": 1})).await.unwrap();
        store.set("k", json!({"v": 2})).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(json!({"v": 2})));
        assert_eq!(store.entry_count().await, 1);
    }

    #[tokio::test]
    async fn remove_absent_key_fails_with_not_found() {
        let store = InMemoryStateStore::new();
        let result = store.remove("missing").await;
        assert!(matches!(
            result,
            Err(StateStoreError::NotFound { ref key }) if key == "missing"
        ));
    }

    #[tokio::test]
    async fn remove_then_exists_is_false() {
        let store = InMemoryStateStore::new();
        store.set("k", json!(1)).await.unwrap();
        assert!(store.exists("k").await.unwrap());

        store.remove("k").await.unwrap();
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn remove_covers_counters_and_sets() {
        let store = InMemoryStateStore::new();
        store.increment("c", 3).await.unwrap();
        store.add_set_member("s", "m").await.unwrap();

        assert!(store.exists("c").await.unwrap());
        assert!(store.exists("s").await.unwrap());

        store.remove("c").await.unwrap();
        store.remove("s").await.unwrap();

        assert_eq!(store.counter("c").await.unwrap(), 0);
        assert!(store.set_members("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn increment_starts_at_zero_and_returns_post_value() {
        let store = InMemoryStateStore::new();
        assert_eq!(store.counter("c").await.unwrap(), 0);
        assert_eq!(store.increment("c", 1).await.unwrap(), 1);
        assert_eq!(store.increment("c", 2).await.unwrap(), 3);
        assert_eq!(store.counter("c").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn concurrent_increments_lose_no_updates() {
        let store = InMemoryStateStore::new();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(
                async move { store.increment("c", 1).await },
            ));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.counter("c").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn set_members_tracks_unique_members() {
        let store = InMemoryStateStore::new();
        store.add_set_member("s", "a").await.unwrap();
        store.add_set_member("s", "b").await.unwrap();
        store.add_set_member("s", "a").await.unwrap();

        let members = store.set_members("s").await.unwrap();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn set_members_of_absent_set_is_empty() {
        let store = InMemoryStateStore::new();
        assert!(store.set_members("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_count_counts_set_calls_only() {
        let store = InMemoryStateStore::new();
        assert_eq!(store.write_count(), 0);

        store.set("k", json!(1)).await.unwrap();
        store.increment("c", 1).await.unwrap();
        store.add_set_member("s", "m").await.unwrap();

        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let store = InMemoryStateStore::new();
        store.set("k", json!(1)).await.unwrap();
        store.increment("c", 5).await.unwrap();
        store.add_set_member("s", "m").await.unwrap();

        store.clear().await;

        assert!(store.get("k").await.unwrap().is_none());
        assert_eq!(store.counter("c").await.unwrap(), 0);
        assert!(store.set_members("s").await.unwrap().is_empty());
    }
}
