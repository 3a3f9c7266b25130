//! Lightweight admin HTTP server
//!
//! Exposes `/healthz` and `/metrics` endpoints, with metrics provided by caller.

use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::types::Health;

pub type MetricsFn = fn() -> (StatusCode, String);

async fn healthz() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// Build the admin router. The metrics body is produced by `metrics_fn` on every scrape.
pub fn admin_router(metrics_fn: MetricsFn) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(move || async move { metrics_fn() }))
}

/// Spawn the admin server on the current runtime.
///
/// Bind or serve failures are logged; they never take the caller down.
pub fn spawn_admin_server(addr: &str, metrics_fn: MetricsFn) -> JoinHandle<()> {
    let addr = addr.to_string();
    tokio::spawn(async move {
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(%addr, error = %e, "admin server bind failed");
                return;
            }
        };
        info!(%addr, "admin server listening");
        if let Err(e) = axum::serve(listener, admin_router(metrics_fn)).await {
            error!(%addr, error = %e, "admin server stopped");
        }
    })
}
