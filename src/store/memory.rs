// Reaction Guard: in-memory key-value store
// TTL-aware implementation of the store contract, used by tests and local
// runs. Production deployments plug in the platform's key-value service.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;

use super::{KeyValueStore, Transform};
use crate::error::StoreError;

struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// In-process store. `atomic_update` holds a dedicated lock across the
/// read-transform-write cycle so concurrent updaters to the same key are
/// fully serialized, matching the contract's exactly-once-effective rule.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    update_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            update_lock: Mutex::new(()),
        }
    }

    fn read_live(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.expires_at <= Utc::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    fn write(&self, key: &str, value: Value, ttl_seconds: u64) {
        let mut entries = self.entries.write();
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Utc::now() + Duration::seconds(ttl_seconds as i64),
            },
        );
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_live(key))
    }

    async fn set(&self, key: &str, value: Value, ttl_seconds: u64) -> Result<(), StoreError> {
        self.write(key, value, ttl_seconds);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn atomic_update(
        &self,
        key: &str,
        ttl_seconds: u64,
        transform: Transform<'_>,
    ) -> Result<Value, StoreError> {
        let _guard = self.update_lock.lock();
        let current = self.read_live(key);
        let next = transform(current);
        self.write(key, next.clone(), ttl_seconds);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();

        store.set("k", json!({"a": 1}), 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));

        assert!(store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entry_is_gone() {
        let store = MemoryStore::new();

        // TTL of zero expires immediately
        store.set("gone", json!(1), 0).await.unwrap();
        assert_eq!(store.get("gone").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_atomic_update_applies_transform_to_current() {
        let store = MemoryStore::new();

        let v = store
            .atomic_update("counter", 60, &|current| match current {
                Some(Value::Number(n)) => json!(n.as_i64().unwrap_or(0) + 1),
                _ => json!(1),
            })
            .await
            .unwrap();
        assert_eq!(v, json!(1));

        let v = store
            .atomic_update("counter", 60, &|current| match current {
                Some(Value::Number(n)) => json!(n.as_i64().unwrap_or(0) + 1),
                _ => json!(1),
            })
            .await
            .unwrap();
        assert_eq!(v, json!(2));
    }

    #[tokio::test]
    async fn test_concurrent_atomic_updates_are_serialized() {
        let store = Arc::new(MemoryStore::new());

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .atomic_update("hits", 60, &|current| match current {
                        Some(Value::Number(n)) => json!(n.as_i64().unwrap_or(0) + 1),
                        _ => json!(1),
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get("hits").await.unwrap(), Some(json!(20)));
    }
}
