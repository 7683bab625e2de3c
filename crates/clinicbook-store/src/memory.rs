//! In-memory store
//!
//! Backs tab-scoped state in production and every scope in tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{KeyValueStore, StorageScope, StoreResult};

/// Process-local key/value store
#[derive(Debug, Clone)]
pub struct MemoryStore {
    scope: StorageScope,
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store for the given scope
    pub fn new(scope: StorageScope) -> Self {
        Self {
            scope,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create an empty tab-scoped store
    pub fn tab() -> Self {
        Self::new(StorageScope::Tab)
    }

    /// Create an empty profile-scoped store
    pub fn profile() -> Self {
        Self::new(StorageScope::Profile)
    }

    /// Number of keys currently held
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no keys
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every key (a closed tab)
    pub async fn wipe(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn scope(&self) -> StorageScope {
        self.scope
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}
