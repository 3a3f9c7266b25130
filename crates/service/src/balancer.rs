//! Backend instance selection.
//!
//! Both strategies answer the same question for one routing decision: given
//! the candidate set the discovery collaborator produced, which instance gets
//! the request. An empty candidate set is reported as
//! [`Selection::NoneAvailable`], never as an arbitrary pick.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const HEALTH_STATUS_KEY: &str = "health.status";
pub const ENABLED_KEY: &str = "enabled";
pub const WEIGHT_KEY: &str = "weight";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendInstance {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl BackendInstance {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self { id: id.into(), address: address.into(), metadata: HashMap::new() }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// `health.status` decides when present (`UP`/`HEALTHY`), otherwise the
    /// `enabled` flag, otherwise the instance counts as healthy.
    pub fn is_healthy(&self) -> bool {
        if let Some(status) = self.metadata.get(HEALTH_STATUS_KEY) {
            let healthy = status.eq_ignore_ascii_case("UP") || status.eq_ignore_ascii_case("HEALTHY");
            if !healthy {
                debug!(instance = %self.id, %status, "instance not healthy");
            }
            return healthy;
        }
        if let Some(enabled) = self.metadata.get(ENABLED_KEY) {
            let enabled = enabled.eq_ignore_ascii_case("true");
            if !enabled {
                debug!(instance = %self.id, "instance disabled");
            }
            return enabled;
        }
        true
    }

    /// Integer `weight` metadata; missing means 1, negatives count as 0.
    pub fn weight(&self) -> u64 {
        match self.metadata.get(WEIGHT_KEY) {
            None => 1,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(w) => w.max(0) as u64,
                Err(_) => {
                    warn!(instance = %self.id, weight = %raw, "invalid weight value, using 1");
                    1
                }
            },
        }
    }
}

/// Outcome of one selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a> {
    /// Picked by the strategy's normal rule.
    Chosen(&'a BackendInstance),
    /// Picked by a fallback rule: no healthy instance existed, or every
    /// weight was zero. The caller still gets an instance.
    Fallback(&'a BackendInstance),
    NoneAvailable,
}

impl<'a> Selection<'a> {
    pub fn instance(&self) -> Option<&'a BackendInstance> {
        match *self {
            Selection::Chosen(i) | Selection::Fallback(i) => Some(i),
            Selection::NoneAvailable => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Selection::Fallback(_))
    }
}

pub trait LoadBalancer: Send + Sync {
    fn name(&self) -> &'static str;
    fn select<'a>(&self, candidates: &'a [BackendInstance]) -> Selection<'a>;
}

fn wall_clock_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Filters out unhealthy instances, then rotates over the rest by wall-clock
/// milliseconds.
///
/// When no instance is healthy the full candidate set is used instead, so a
/// request is never refused while any instance exists. Such picks come back
/// as [`Selection::Fallback`].
#[derive(Debug, Clone, Copy)]
pub struct HealthAwareBalancer {
    clock: fn() -> i64,
}

impl Default for HealthAwareBalancer {
    fn default() -> Self {
        Self { clock: wall_clock_millis }
    }
}

impl HealthAwareBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: fn() -> i64) -> Self {
        Self { clock }
    }
}

impl LoadBalancer for HealthAwareBalancer {
    fn name(&self) -> &'static str {
        "health_aware"
    }

    fn select<'a>(&self, candidates: &'a [BackendInstance]) -> Selection<'a> {
        match candidates {
            [] => {
                warn!("no instances available");
                return Selection::NoneAvailable;
            }
            [only] => return Selection::Chosen(only),
            _ => {}
        }

        let healthy: Vec<&BackendInstance> = candidates.iter().filter(|i| i.is_healthy()).collect();
        let (pool, fallback) = if healthy.is_empty() {
            warn!(total = candidates.len(), "no healthy instances, falling back to all instances");
            (candidates.iter().collect::<Vec<_>>(), true)
        } else {
            (healthy, false)
        };

        let idx = ((self.clock)().rem_euclid(pool.len() as i64)) as usize;
        let selected = pool[idx];
        debug!(instance = %selected.id, pool = pool.len(), "selected instance");
        if fallback {
            Selection::Fallback(selected)
        } else {
            Selection::Chosen(selected)
        }
    }
}

/// Random pick proportional to each instance's `weight` metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedBalancer;

impl WeightedBalancer {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for WeightedBalancer {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn select<'a>(&self, candidates: &'a [BackendInstance]) -> Selection<'a> {
        match candidates {
            [] => {
                warn!("no instances available");
                return Selection::NoneAvailable;
            }
            [only] => return Selection::Chosen(only),
            _ => {}
        }

        let weights: Vec<u64> = candidates.iter().map(BackendInstance::weight).collect();
        let total = weights.iter().fold(0u64, |acc, w| acc.saturating_add(*w));
        let mut rng = rand::thread_rng();

        if total == 0 {
            let selected = &candidates[rng.gen_range(0..candidates.len())];
            debug!(instance = %selected.id, "all weights zero, picked uniformly");
            return Selection::Fallback(selected);
        }

        let point = rng.gen_range(0..total);
        let mut cumulative = 0u64;
        for (instance, weight) in candidates.iter().zip(&weights) {
            cumulative = cumulative.saturating_add(*weight);
            if point < cumulative {
                debug!(instance = %instance.id, weight, "selected instance");
                return Selection::Chosen(instance);
            }
        }
        // unreachable while point < total; keep the first instance as the answer
        Selection::Chosen(&candidates[0])
    }
}
