use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use configs::RateLimitConfig;
use service::store::{AtomicScript, Store, StoreError};
use tracing::{debug, warn};

use super::RATE_LIMIT_ORDER;
use crate::chain::{Filter, FilterAction};
use crate::context::RequestContext;
use crate::errors::GatewayResponse;
use crate::observability::{RATE_LIMITED_TOTAL, RATE_LIMIT_FAIL_OPEN_TOTAL};

/// Admission decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Counted inside the current window.
    Allowed { count: u64 },
    /// Route not limited, or limiter disabled.
    Bypassed,
    /// Store failed; let through without counting.
    FailedOpen,
    Rejected { count: u64 },
}

impl Admission {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Admission::Rejected { .. })
    }
}

/// Fixed-window counter per (client, route) kept in the shared store.
///
/// The window opens with the first counted request and closes when the
/// store expires the key. By default the count is read, compared and then
/// incremented as separate commands, so concurrent requests can slip a few
/// past the limit. `atomic` mode does the increment and expiry in one script.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn Store>,
    max_requests: u64,
    window: Duration,
    routes: Arc<Vec<String>>,
    atomic: bool,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, cfg: &RateLimitConfig) -> Self {
        Self {
            store,
            max_requests: cfg.max_requests,
            window: Duration::from_secs(cfg.window_secs),
            routes: Arc::new(cfg.routes.clone()),
            atomic: cfg.atomic,
            enabled: cfg.enabled,
        }
    }

    pub fn applies_to(&self, path: &str) -> bool {
        self.routes.iter().any(|r| path.starts_with(r.as_str()))
    }

    fn window_key(client_key: &str, route_key: &str) -> String {
        format!("rate_limit:{client_key}:{route_key}")
    }

    pub async fn admit(&self, client_key: &str, route_key: &str) -> Admission {
        if !self.enabled || !self.applies_to(route_key) {
            return Admission::Bypassed;
        }

        let key = Self::window_key(client_key, route_key);
        let checked = if self.atomic {
            self.count_atomic(&key).await
        } else {
            self.count_read_then_increment(&key).await
        };

        match checked {
            Ok(admission) => {
                if let Admission::Rejected { count } = admission {
                    warn!(client = %client_key, route = %route_key, count, "rate limit exceeded");
                } else {
                    debug!(client = %client_key, route = %route_key, ?admission, "rate limit check passed");
                }
                admission
            }
            Err(e) => {
                RATE_LIMIT_FAIL_OPEN_TOTAL.inc();
                warn!(client = %client_key, route = %route_key, error = %e, "rate limit check failed, allowing request");
                Admission::FailedOpen
            }
        }
    }

    async fn count_read_then_increment(&self, key: &str) -> Result<Admission, StoreError> {
        let current = match self.store.get(key).await? {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| StoreError::Protocol(format!("counter {key} holds {raw:?}")))?,
            None => 0,
        };
        if current >= self.max_requests {
            return Ok(Admission::Rejected { count: current });
        }

        // open the window with value and TTL in one command
        if current == 0 && self.store.set(key, "1", Some(self.window), true).await? {
            return Ok(Admission::Allowed { count: 1 });
        }

        let count = self.store.incr(key).await?;
        if count == 1 {
            if let Err(e) = self.store.expire(key, self.window).await {
                // a counter without TTL would never reset
                if let Err(del_err) = self.store.del(key).await {
                    warn!(key, error = %del_err, "failed to drop counter left without expiry");
                }
                return Err(e);
            }
        }
        Ok(Admission::Allowed { count: count.max(0) as u64 })
    }

    async fn count_atomic(&self, key: &str) -> Result<Admission, StoreError> {
        let window_ms = self.window.as_millis().to_string();
        let count = self
            .store
            .eval(AtomicScript::IncrementWithExpiry, &[key], &[window_ms.as_str()])
            .await?
            .max(0) as u64;
        if count > self.max_requests {
            Ok(Admission::Rejected { count })
        } else {
            Ok(Admission::Allowed { count })
        }
    }
}

#[async_trait]
impl Filter for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn order(&self) -> i32 {
        RATE_LIMIT_ORDER
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterAction {
        if self.admit(&ctx.client_ip, &ctx.path).await.is_rejected() {
            RATE_LIMITED_TOTAL.inc();
            return FilterAction::Respond(GatewayResponse::too_many_requests());
        }
        FilterAction::Continue
    }
}
