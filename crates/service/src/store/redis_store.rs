use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use super::{AtomicScript, Store, StoreError};

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Protocol(e.to_string())
        }
    }
}

/// Redis-backed store with automatic reconnection.
///
/// Every command is bounded by `command_timeout`; an elapsed timeout surfaces
/// as [`StoreError::Timeout`] so callers apply their fail-open or fail-closed
/// policy instead of hanging.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    command_timeout: Duration,
}

impl RedisStore {
    /// Connect to Redis server
    ///
    /// Supports both redis:// and rediss:// (TLS) URLs
    pub async fn connect(url: &str, command_timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, command_timeout })
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(res) => res.map_err(StoreError::from),
            Err(_) => {
                warn!(op, timeout_ms = self.command_timeout.as_millis() as u64, "redis command timed out");
                Err(StoreError::Timeout(self.command_timeout))
            }
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded("get", async move { conn.get(key).await }).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>, if_absent: bool) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis() as u64);
        }
        if if_absent {
            cmd.arg("NX");
        }
        // NX answers nil when the key already exists
        let reply: Option<String> = self.bounded("set", async move { cmd.query_async(&mut conn).await }).await?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = self.bounded("del", async move { conn.del(key).await }).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded("exists", async move { conn.exists(key).await }).await
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded("incr", async move { conn.incr(key, 1i64).await }).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("PEXPIRE");
        cmd.arg(key).arg(ttl.as_millis() as u64);
        let applied: i64 = self.bounded("expire", async move { cmd.query_async(&mut conn).await }).await?;
        Ok(applied == 1)
    }

    async fn eval(&self, script: AtomicScript, keys: &[&str], args: &[&str]) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let lua = redis::Script::new(script.lua());
        let mut invocation = lua.prepare_invoke();
        for key in keys {
            invocation.key(*key);
        }
        for arg in args {
            invocation.arg(*arg);
        }
        self.bounded("eval", async move { invocation.invoke_async(&mut conn).await }).await
    }
}
