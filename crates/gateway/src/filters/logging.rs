use std::time::Instant;

use async_trait::async_trait;
use axum::http::StatusCode;
use tracing::info;

use super::LOGGING_ORDER;
use crate::chain::{Filter, FilterAction};
use crate::context::RequestContext;
use crate::observability::{REQUESTS_TOTAL, REQUEST_DURATION, RESPONSES_TOTAL};

/// Captures the entry instant first and records latency and final status
/// last, so it brackets every other filter and the routed handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestLogger;

#[async_trait]
impl Filter for RequestLogger {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn order(&self) -> i32 {
        LOGGING_ORDER
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterAction {
        ctx.started_at = Some(Instant::now());
        REQUESTS_TOTAL.inc();
        info!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            client_ip = %ctx.client_ip,
            "request started"
        );
        FilterAction::Continue
    }

    fn on_complete(&self, ctx: &RequestContext, status: StatusCode) {
        let elapsed = ctx.started_at.map(|t| t.elapsed()).unwrap_or_default();
        REQUEST_DURATION.observe(elapsed.as_secs_f64());
        RESPONSES_TOTAL.with_label_values(&[status.as_str()]).inc();
        info!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            status = status.as_u16(),
            elapsed_ms = elapsed.as_millis() as u64,
            "request completed"
        );
    }
}
