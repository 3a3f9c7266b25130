//! Distributed mutual exclusion on top of a [`Store`].
//!
//! A lock is a single key holding the owner's token, written with
//! SET-if-absent plus a TTL and removed with an atomic compare-and-delete.
//! The TTL bounds how long a crashed holder can keep the resource.
//!
//! ```
//! use std::{sync::Arc, time::Duration};
//! use service::lock::DistributedLock;
//! use service::store::MemoryStore;
//!
//! let lock = DistributedLock::new(Arc::new(MemoryStore::new()));
//! let total = tokio_test::block_on(lock.execute_with_lock("order:42", Duration::from_secs(10), || async { 40 + 2 }));
//! assert_eq!(total.unwrap(), 42);
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::store::{AtomicScript, Store, StoreError};

pub const DEFAULT_LOCK_PREFIX: &str = "lock:";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to acquire lock: {key}")]
    AcquisitionFailed { key: String },
    #[error("lock ttl must be positive")]
    InvalidTtl,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Proof of a successful acquisition. Only the holder of the handle can
/// release the lock, and releasing consumes it.
#[derive(Debug)]
pub struct LockHandle {
    key: String,
    token: String,
    acquired_at: DateTime<Utc>,
}

impl LockHandle {
    /// Full store key, prefix included.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }
}

#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn Store>,
    prefix: String,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_prefix(store, DEFAULT_LOCK_PREFIX)
    }

    pub fn with_prefix(store: Arc<dyn Store>, prefix: impl Into<String>) -> Self {
        Self { store, prefix: prefix.into() }
    }

    fn store_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn fresh_token() -> String {
        format!("{}-{}", std::process::id(), Uuid::new_v4())
    }

    /// Try once to take the lock. `Ok(None)` means somebody else holds it.
    pub async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockHandle>, LockError> {
        if ttl.is_zero() {
            return Err(LockError::InvalidTtl);
        }
        let lock_key = self.store_key(key);
        let token = Self::fresh_token();
        let acquired = self.store.set(&lock_key, &token, Some(ttl), true).await.map_err(|e| {
            error!(key = %lock_key, error = %e, "error acquiring lock");
            e
        })?;
        if !acquired {
            debug!(key = %lock_key, "lock already held");
            return Ok(None);
        }
        debug!(key = %lock_key, %token, ttl_ms = ttl.as_millis() as u64, "acquired lock");
        Ok(Some(LockHandle { key: lock_key, token, acquired_at: Utc::now() }))
    }

    /// Release with compare-and-delete. `Ok(false)` means the key no longer
    /// holds this handle's token (expired, or taken over after expiry); the
    /// current holder is left untouched.
    pub async fn release(&self, handle: LockHandle) -> Result<bool, LockError> {
        release_with(self.store.as_ref(), &handle).await
    }

    /// Run `task` while holding the lock.
    ///
    /// The lock is released on every exit path: inline after `task` finishes,
    /// or from a drop guard when `task` panics or the returned future is
    /// dropped before completion. The guard schedules the release on the
    /// current tokio runtime.
    pub async fn execute_with_lock<T, F, Fut>(&self, key: &str, ttl: Duration, task: F) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let handle = self
            .try_acquire(key, ttl)
            .await?
            .ok_or_else(|| LockError::AcquisitionFailed { key: key.to_string() })?;

        let mut guard = ReleaseGuard { store: Arc::clone(&self.store), handle: Some(handle) };
        let out = task().await;

        // the guard stays armed until the release has completed, so a caller
        // dropped mid-release still gets the deferred one
        if let Some(handle) = guard.handle.as_ref() {
            if let Err(e) = release_with(self.store.as_ref(), handle).await {
                // the TTL still frees the key; the task result is not lost over it
                warn!(key = %handle.key, error = %e, "release after locked task failed");
            }
        }
        guard.handle = None;
        Ok(out)
    }

    /// Existence probe. Informational only, the answer can be stale by the
    /// time the caller acts on it.
    pub async fn is_locked(&self, key: &str) -> Result<bool, LockError> {
        Ok(self.store.exists(&self.store_key(key)).await?)
    }

    /// Delete the lock regardless of owner. Breaks mutual exclusion for the
    /// current holder; meant for operators clearing a stuck key.
    pub async fn force_unlock(&self, key: &str) -> Result<bool, LockError> {
        let lock_key = self.store_key(key);
        let removed = self.store.del(&lock_key).await?;
        warn!(key = %lock_key, removed, "force unlock");
        Ok(removed)
    }
}

async fn release_with(store: &dyn Store, handle: &LockHandle) -> Result<bool, LockError> {
    let removed = store
        .eval(AtomicScript::CompareAndDelete, &[handle.key.as_str()], &[handle.token.as_str()])
        .await?;
    if removed == 1 {
        debug!(key = %handle.key, token = %handle.token, "released lock");
        Ok(true)
    } else {
        warn!(key = %handle.key, token = %handle.token, "lock not released, owner changed or ttl expired");
        Ok(false)
    }
}

struct ReleaseGuard {
    store: Arc<dyn Store>,
    handle: Option<LockHandle>,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else { return };
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                let store = Arc::clone(&self.store);
                rt.spawn(async move {
                    if let Err(e) = release_with(store.as_ref(), &handle).await {
                        warn!(key = %handle.key, error = %e, "deferred lock release failed");
                    }
                });
            }
            Err(_) => {
                warn!(key = %handle.key, "no runtime to release lock, leaving it to ttl expiry");
            }
        }
    }
}
