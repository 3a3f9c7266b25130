use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use super::{first, AtomicScript, Store, StoreError};

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: String, ttl: Option<Duration>, now: Instant) -> Self {
        Self { value, expires_at: ttl.map(|t| now + t) }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Single-process store for development and tests.
///
/// Each primitive runs under the dashmap shard lock of its key, which gives
/// the same per-key atomicity the Redis commands provide. Expiry is evaluated
/// lazily against `tokio::time::Instant`, so a paused test clock drives it.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, slot| slot.is_live(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "purged expired keys");
        }
        removed
    }

    fn increment(&self, key: &str, window: Option<Duration>) -> Result<i64, StoreError> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut o) if o.get().is_live(now) => {
                let slot = o.get_mut();
                let n: i64 = slot
                    .value
                    .parse()
                    .map_err(|_| StoreError::Protocol(format!("value at {key} is not an integer")))?;
                let n = n
                    .checked_add(1)
                    .ok_or_else(|| StoreError::Protocol(format!("increment would overflow {key}")))?;
                slot.value = n.to_string();
                Ok(n)
            }
            Entry::Occupied(mut o) => {
                o.insert(Slot::new("1".to_string(), window, now));
                Ok(1)
            }
            Entry::Vacant(v) => {
                v.insert(Slot::new("1".to_string(), window, now));
                Ok(1)
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(slot) if slot.is_live(now) => return Ok(Some(slot.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, slot| !slot.is_live(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>, if_absent: bool) -> Result<bool, StoreError> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut o) => {
                if if_absent && o.get().is_live(now) {
                    return Ok(false);
                }
                o.insert(Slot::new(value.to_string(), ttl, now));
                Ok(true)
            }
            Entry::Vacant(v) => {
                v.insert(Slot::new(value.to_string(), ttl, now));
                Ok(true)
            }
        }
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self.entries.remove(key).map_or(false, |(_, slot)| slot.is_live(now)))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.increment(key, None)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut slot) if slot.is_live(now) => {
                slot.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn eval(&self, script: AtomicScript, keys: &[&str], args: &[&str]) -> Result<i64, StoreError> {
        let key = first(keys, "one key")?;
        match script {
            AtomicScript::CompareAndDelete => {
                let expected = first(args, "the expected value")?;
                let now = Instant::now();
                let removed = self
                    .entries
                    .remove_if(key, |_, slot| slot.is_live(now) && slot.value == expected);
                Ok(i64::from(removed.is_some()))
            }
            AtomicScript::IncrementWithExpiry => {
                let window_ms: u64 = first(args, "a window in milliseconds")?
                    .parse()
                    .map_err(|_| StoreError::Protocol("window must be integer milliseconds".into()))?;
                self.increment(key, Some(Duration::from_millis(window_ms)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_only_writes_once() {
        let store = MemoryStore::new();
        assert!(store.set("k", "a", None, true).await.unwrap());
        assert!(!store.set("k", "b", None, true).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));

        // plain SET overwrites
        assert!(store.set("k", "c", None, false).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expiry_frees_the_key() {
        let store = MemoryStore::new();
        store.set("k", "a", Some(Duration::from_secs(10)), true).await.unwrap();
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!store.exists("k").await.unwrap());
        assert!(store.set("k", "b", Some(Duration::from_secs(10)), true).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn incr_keeps_existing_expiry() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert!(store.expire("c", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.incr("c").await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("c").await.unwrap(), None);
        assert_eq!(store.incr("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn incr_rejects_non_integer_values() {
        let store = MemoryStore::new();
        store.set("k", "abc", None, false).await.unwrap();
        assert!(matches!(store.incr("k").await, Err(StoreError::Protocol(_))));
    }

    #[tokio::test]
    async fn incr_at_max_is_an_error_not_a_wrap() {
        let store = MemoryStore::new();
        store.set("k", &i64::MAX.to_string(), None, false).await.unwrap();
        assert!(matches!(store.incr("k").await, Err(StoreError::Protocol(_))));
        assert_eq!(store.get("k").await.unwrap(), Some(i64::MAX.to_string()));
    }

    #[tokio::test]
    async fn expire_on_missing_key_reports_false() {
        let store = MemoryStore::new();
        assert!(!store.expire("nope", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn compare_and_delete_checks_value() {
        let store = MemoryStore::new();
        store.set("lock:a", "owner-1", None, true).await.unwrap();

        let other = store.eval(AtomicScript::CompareAndDelete, &["lock:a"], &["owner-2"]).await.unwrap();
        assert_eq!(other, 0);
        assert!(store.exists("lock:a").await.unwrap());

        let mine = store.eval(AtomicScript::CompareAndDelete, &["lock:a"], &["owner-1"]).await.unwrap();
        assert_eq!(mine, 1);
        assert!(!store.exists("lock:a").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn increment_with_expiry_sets_window_on_first_hit() {
        let store = MemoryStore::new();
        let n = store.eval(AtomicScript::IncrementWithExpiry, &["w"], &["1000"]).await.unwrap();
        assert_eq!(n, 1);
        let n = store.eval(AtomicScript::IncrementWithExpiry, &["w"], &["1000"]).await.unwrap();
        assert_eq!(n, 2);

        tokio::time::advance(Duration::from_millis(1001)).await;
        let n = store.eval(AtomicScript::IncrementWithExpiry, &["w"], &["1000"]).await.unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn eval_without_key_is_a_protocol_error() {
        let store = MemoryStore::new();
        let res = store.eval(AtomicScript::CompareAndDelete, &[], &["x"]).await;
        assert!(matches!(res, Err(StoreError::Protocol(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired() {
        let store = MemoryStore::new();
        store.set("short", "1", Some(Duration::from_secs(1)), false).await.unwrap();
        store.set("long", "1", None, false).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert!(store.exists("long").await.unwrap());
    }
}
