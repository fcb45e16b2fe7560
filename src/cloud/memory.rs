//! In-process `StatusStore`.
//!
//! Backs `pickarm sequence` when nothing should reach the cloud, and every
//! test that needs a store. Keeps a journal of writes and subscriptions.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::cloud::{Change, ChangeStream, StatusStore, normalize_key};
use crate::error::Result;

const CHANNEL_CAPACITY: usize = 64;

/// Memory-backed key-value store with change broadcast.
#[derive(Debug)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
    writes: Mutex<Vec<(String, Value)>>,
    subscriptions: Mutex<Vec<(String, Instant)>>,
    changes: broadcast::Sender<(String, Value)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            values: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            changes,
        }
    }

    /// Preset a value without journaling it as a write.
    pub fn with_value(self, key: &str, value: Value) -> Self {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize_key(key), value);
        self
    }

    /// Every `set` call in order
    pub fn writes(&self) -> Vec<(String, Value)> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Values written to one key, in order
    pub fn writes_to(&self, key: &str) -> Vec<Value> {
        let key = normalize_key(key);
        self.writes()
            .into_iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v)
            .collect()
    }

    /// Every `subscribe` call with the time it happened
    pub fn subscriptions(&self) -> Vec<(String, Instant)> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(&normalize_key(key)).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let key = normalize_key(key);
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), value.clone());
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.clone(), value.clone()));

        // No receivers is fine
        let _ = self.changes.send((key, value));
        Ok(())
    }

    async fn subscribe(&self, key: &str) -> Result<ChangeStream> {
        let key = normalize_key(key);
        let rx = self.changes.subscribe();
        let initial = self.get(&key).await?.unwrap_or(Value::Null);

        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.clone(), Instant::now()));

        let first = futures::stream::once(async move { Ok(Change::root(initial)) });
        let rest = futures::stream::unfold((rx, key), |(mut rx, key)| async move {
            loop {
                match rx.recv().await {
                    Ok((changed, value)) if changed == key => {
                        return Some((Ok(Change::root(value)), (rx, key)));
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Memory store subscriber lagged by {} changes", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(first.chain(rest).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_set() {
        let store = MemoryStore::new();
        assert_eq!(store.get("robot/status").await.unwrap(), None);

        store.set("/robot/status", json!("task_done")).await.unwrap();
        assert_eq!(
            store.get("robot/status").await.unwrap(),
            Some(json!("task_done"))
        );
        assert_eq!(store.writes_to("robot/status"), vec![json!("task_done")]);
    }

    #[tokio::test]
    async fn test_subscribe_yields_current_then_changes() {
        let store = MemoryStore::new().with_value("robot/status", json!("moving"));
        let mut changes = store.subscribe("robot/status").await.unwrap();

        store.set("robot/other", json!(1)).await.unwrap();
        store.set("robot/status", json!("waiting")).await.unwrap();

        let first = changes.next().await.unwrap().unwrap();
        assert_eq!(first, Change::root(json!("moving")));
        let second = changes.next().await.unwrap().unwrap();
        assert_eq!(second, Change::root(json!("waiting")));
        assert_eq!(store.subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_absent_key_starts_null() {
        let store = MemoryStore::new();
        let mut changes = store.subscribe("arm/servos").await.unwrap();
        let first = changes.next().await.unwrap().unwrap();
        assert_eq!(first.data, Value::Null);
    }

    #[tokio::test]
    async fn test_with_value_not_journaled() {
        let store = MemoryStore::new().with_value("robot/status", json!("idle"));
        assert!(store.writes().is_empty());
    }
}
