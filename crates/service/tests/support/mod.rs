//! Store doubles shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use service::store::{AtomicScript, MemoryStore, Store, StoreError};

/// Memory store that counts compare-and-delete calls.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    releases: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>, if_absent: bool) -> Result<bool, StoreError> {
        self.inner.set(key, value, ttl, if_absent).await
    }
    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.del(key).await
    }
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.inner.incr(key).await
    }
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.expire(key, ttl).await
    }
    async fn eval(&self, script: AtomicScript, keys: &[&str], args: &[&str]) -> Result<i64, StoreError> {
        if script == AtomicScript::CompareAndDelete {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.eval(script, keys, args).await
    }
}

/// Store whose every call fails as if the server were down.
pub struct DownStore;

fn down<T>() -> Result<T, StoreError> {
    Err(StoreError::Unavailable("connection refused".into()))
}

#[async_trait]
impl Store for DownStore {
    async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
        down()
    }
    async fn set(&self, _: &str, _: &str, _: Option<Duration>, _: bool) -> Result<bool, StoreError> {
        down()
    }
    async fn del(&self, _: &str) -> Result<bool, StoreError> {
        down()
    }
    async fn exists(&self, _: &str) -> Result<bool, StoreError> {
        down()
    }
    async fn incr(&self, _: &str) -> Result<i64, StoreError> {
        down()
    }
    async fn expire(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
        down()
    }
    async fn eval(&self, _: AtomicScript, _: &[&str], _: &[&str]) -> Result<i64, StoreError> {
        down()
    }
}

/// Memory store whose compare-and-delete takes `delay` to answer, leaving a
/// window where the releasing caller can be dropped.
pub struct SlowReleaseStore {
    inner: MemoryStore,
    delay: Duration,
}

impl SlowReleaseStore {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self { inner: MemoryStore::new(), delay })
    }
}

#[async_trait]
impl Store for SlowReleaseStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>, if_absent: bool) -> Result<bool, StoreError> {
        self.inner.set(key, value, ttl, if_absent).await
    }
    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.del(key).await
    }
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.inner.incr(key).await
    }
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.expire(key, ttl).await
    }
    async fn eval(&self, script: AtomicScript, keys: &[&str], args: &[&str]) -> Result<i64, StoreError> {
        if script == AtomicScript::CompareAndDelete {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.eval(script, keys, args).await
    }
}
