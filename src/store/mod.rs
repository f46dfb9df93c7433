// Reaction Guard: key-value store contract
// The persistence layer is an external collaborator; only this contract is
// consumed. All cross-request state (windows, penalties, violations, events)
// lives behind it, keyed by string, with per-key TTLs.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::StoreError;

/// Transform applied under `atomic_update`. Must be pure: the store may
/// re-invoke it on write conflict.
pub type Transform<'a> = &'a (dyn Fn(Option<Value>) -> Value + Send + Sync);

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value, ttl_seconds: u64) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Read-modify-write: reads the current value (or `None`), applies the
    /// transform, writes the result back with the given TTL. The store must
    /// serialize concurrent callers on the same key (CAS or retry) so the
    /// transform is exactly-once-effective. Returns the written value.
    async fn atomic_update(
        &self,
        key: &str,
        ttl_seconds: u64,
        transform: Transform<'_>,
    ) -> Result<Value, StoreError>;
}

/// Shared handle used throughout the crate.
pub type StoreHandle = Arc<dyn KeyValueStore>;

/// Typed read on top of the raw contract.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Typed write on top of the raw contract.
pub async fn set_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
    ttl_seconds: u64,
) -> Result<(), StoreError> {
    store
        .set(key, serde_json::to_value(value)?, ttl_seconds)
        .await
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Store whose every operation fails with a backend error, for exercising
    /// the fail-open paths.
    pub(crate) struct FailingStore;

    fn backend_down() -> StoreError {
        StoreError::Backend("backend unreachable".to_string())
    }

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<Value>, StoreError> {
            Err(backend_down())
        }

        async fn set(&self, _key: &str, _value: Value, _ttl: u64) -> Result<(), StoreError> {
            Err(backend_down())
        }

        async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
            Err(backend_down())
        }

        async fn atomic_update(
            &self,
            _key: &str,
            _ttl: u64,
            _transform: Transform<'_>,
        ) -> Result<Value, StoreError> {
            Err(backend_down())
        }
    }
}
