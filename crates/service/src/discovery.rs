//! Instance lists handed to the load balancer.
//!
//! The registry that maintains them is external; the edge only ever reads a
//! snapshot per routing decision.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::balancer::BackendInstance;

pub trait InstanceSource: Send + Sync {
    /// Current candidate set. The snapshot stays valid while the source is
    /// updated concurrently.
    fn instances(&self) -> Arc<Vec<BackendInstance>>;
}

/// Source whose list is replaced wholesale, e.g. from configuration or a
/// registry watch task.
#[derive(Clone)]
pub struct StaticDiscovery {
    current: Arc<ArcSwap<Vec<BackendInstance>>>,
}

impl StaticDiscovery {
    pub fn new(instances: Vec<BackendInstance>) -> Self {
        Self { current: Arc::new(ArcSwap::from_pointee(instances)) }
    }

    pub fn replace(&self, instances: Vec<BackendInstance>) {
        info!(count = instances.len(), "instance list replaced");
        self.current.store(Arc::new(instances));
    }
}

impl InstanceSource for StaticDiscovery {
    fn instances(&self) -> Arc<Vec<BackendInstance>> {
        self.current.load_full()
    }
}
