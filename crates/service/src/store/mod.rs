//! Key-value store abstraction shared by the distributed lock and the rate limiter.
//!
//! Every primitive is expected to be atomic on the backing store. Correctness
//! of the coordination primitives built on top rests entirely on that, the
//! callers hold no in-process locks of their own.

pub mod memory;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store command timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected store reply: {0}")]
    Protocol(String),
}

/// Server-side scripts the coordination layer relies on.
///
/// Kept as a closed set so every backend can execute them atomically,
/// Redis as Lua, the memory store natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicScript {
    /// `KEYS[1]`, `ARGV[1]` = expected value. Deletes the key only when it
    /// currently holds the expected value. Returns 1 on delete, else 0.
    CompareAndDelete,
    /// `KEYS[1]`, `ARGV[1]` = window in milliseconds. Increments the key and,
    /// when the result is 1, sets its expiry. Returns the new count.
    IncrementWithExpiry,
}

impl AtomicScript {
    pub fn lua(&self) -> &'static str {
        match self {
            AtomicScript::CompareAndDelete => {
                "if redis.call('get', KEYS[1]) == ARGV[1] then \
                 return redis.call('del', KEYS[1]) \
                 else return 0 end"
            }
            AtomicScript::IncrementWithExpiry => {
                "local n = redis.call('incr', KEYS[1]) \
                 if n == 1 then redis.call('pexpire', KEYS[1], ARGV[1]) end \
                 return n"
            }
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// SET with optional expiry. With `if_absent` the write only happens when
    /// the key does not exist; the return value says whether it was written.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>, if_absent: bool) -> Result<bool, StoreError>;

    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// INCR; a missing key counts from 0.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn eval(&self, script: AtomicScript, keys: &[&str], args: &[&str]) -> Result<i64, StoreError>;
}

fn first<'a>(items: &[&'a str], what: &str) -> Result<&'a str, StoreError> {
    items
        .first()
        .copied()
        .ok_or_else(|| StoreError::Protocol(format!("script needs {what}")))
}
