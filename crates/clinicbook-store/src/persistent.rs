//! Embedded persistent store backed by sled
//!
//! Holds profile-scoped state: the refresh token, the login-attempt table and
//! the audit log. One sled database can serve several stores through trees.

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use crate::{KeyValueStore, StorageScope, StoreError, StoreResult};

/// sled-backed key/value store
#[derive(Debug, Clone)]
pub struct SledStore {
    scope: StorageScope,
    tree: sled::Tree,
}

impl SledStore {
    /// Open (or create) a database at `path` and use its default tree
    pub fn open(path: impl AsRef<Path>, scope: StorageScope) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), %scope, "Opening sled store");
        let db = sled::open(path)?;
        Ok(Self::from_tree(&db, scope))
    }

    /// Open a throwaway database that is deleted on drop
    pub fn temporary(scope: StorageScope) -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::from_tree(&db, scope))
    }

    /// Use the default tree of an already opened database
    pub fn from_tree(db: &sled::Db, scope: StorageScope) -> Self {
        Self {
            scope,
            tree: (**db).clone(),
        }
    }

    /// Use a named tree of an already opened database
    pub fn named(db: &sled::Db, name: &str, scope: StorageScope) -> StoreResult<Self> {
        Ok(Self {
            scope,
            tree: db.open_tree(name)?,
        })
    }
}

#[async_trait]
impl KeyValueStore for SledStore {
    fn scope(&self) -> StorageScope {
        self.scope
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match self.tree.get(key.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|_| StoreError::Encoding(key.to_string())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        self.tree.insert(key.as_bytes(), value.as_bytes())?;
        self.tree.flush()?;
        debug!(key, bytes = value.len(), "Persisted value");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let existed = self.tree.remove(key.as_bytes())?.is_some();
        self.tree.flush()?;
        Ok(existed)
    }
}
