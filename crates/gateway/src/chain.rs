//! Ordered filter pipeline in front of every routed request.
//!
//! Filters run in ascending `order`. Each one either lets the request
//! continue or answers it; after an answer no later filter sees the request.
//! Once the final status is known, `complete` notifies every filter that ran,
//! in reverse order, whichever of them produced the answer.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use tracing::debug;

use crate::context::RequestContext;
use crate::errors::GatewayResponse;

#[derive(Debug)]
pub enum FilterAction {
    Continue,
    Respond(GatewayResponse),
}

#[derive(Debug)]
pub enum ChainOutcome {
    Forward,
    ShortCircuit { filter: &'static str, response: GatewayResponse },
}

#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower runs first.
    fn order(&self) -> i32;

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterAction;

    fn on_complete(&self, _ctx: &RequestContext, _status: StatusCode) {}
}

#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Arc<Vec<Arc<dyn Filter>>>,
}

impl FilterChain {
    pub fn builder() -> FilterChainBuilder {
        FilterChainBuilder::default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub async fn run(&self, ctx: &mut RequestContext) -> ChainOutcome {
        for filter in self.filters.iter() {
            ctx.reached += 1;
            if let FilterAction::Respond(response) = filter.on_request(ctx).await {
                debug!(filter = filter.name(), status = response.status.as_u16(), path = %ctx.path, "short-circuited");
                return ChainOutcome::ShortCircuit { filter: filter.name(), response };
            }
        }
        ChainOutcome::Forward
    }

    pub fn complete(&self, ctx: &RequestContext, status: StatusCode) {
        let reached = ctx.reached.min(self.filters.len());
        for filter in self.filters[..reached].iter().rev() {
            filter.on_complete(ctx, status);
        }
    }
}

#[derive(Default)]
pub struct FilterChainBuilder {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChainBuilder {
    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn with_shared(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn build(mut self) -> FilterChain {
        // stable: equal orders keep registration order
        self.filters.sort_by_key(|f| f.order());
        FilterChain { filters: Arc::new(self.filters) }
    }
}
