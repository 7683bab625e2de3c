//! Fault injection for tests
//!
//! Enabled with the `testing` feature.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{KeyValueStore, MemoryStore, StorageScope, StoreError, StoreResult};

/// Memory store whose reads can be switched to fail with a backend error
///
/// Writes and deletes keep working, the way a flaky disk read looks to the
/// caller. Clones share both the entries and the failure switch.
#[derive(Debug, Clone)]
pub struct FaultyStore {
    inner: MemoryStore,
    fail_reads: Arc<AtomicBool>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_reads: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every following `get` fail (or succeed again)
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// The wrapped store, bypassing the failure switch
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl KeyValueStore for FaultyStore {
    fn scope(&self) -> StorageScope {
        self.inner.scope()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!("read of {key} failed")));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.inner.delete(key).await
    }
}
