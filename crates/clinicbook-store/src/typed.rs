//! JSON-typed access over a raw key/value store

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use crate::{KeyValueStore, StorageScope, StoreResult};

/// Typed view of a [`KeyValueStore`] that (de)serializes values as JSON
#[derive(Clone)]
pub struct TypedStore {
    inner: Arc<dyn KeyValueStore>,
}

impl TypedStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    /// Scope of the wrapped store
    pub fn scope(&self) -> StorageScope {
        self.inner.scope()
    }

    /// Get the underlying raw store
    pub fn raw(&self) -> &Arc<dyn KeyValueStore> {
        &self.inner
    }

    // =========================================================================
    // JSON values
    // =========================================================================

    /// Set a JSON value
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let json = serde_json::to_string(value)?;
        self.inner.set(key, json).await
    }

    /// Get a JSON value
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.inner.get(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Get a JSON value, falling back to `T::default()` when absent
    pub async fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> StoreResult<T> {
        Ok(self.get(key).await?.unwrap_or_default())
    }

    // =========================================================================
    // Plain strings
    // =========================================================================

    /// Set an opaque string value
    pub async fn set_string(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner.set(key, value.to_string()).await
    }

    /// Get an opaque string value
    pub async fn get_string(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    /// Delete a key
    pub async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.inner.delete(key).await
    }
}

impl std::fmt::Debug for TypedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedStore").field("scope", &self.scope()).finish()
    }
}
