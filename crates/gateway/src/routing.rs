//! Terminal handler: picks a downstream instance for requests that made it
//! through the filter chain and reports the decision. Forwarding the bytes
//! is left to whatever sits behind the edge.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use common::types::Envelope;
use serde_json::json;
use service::auth::Identity;
use service::balancer::LoadBalancer;
use service::discovery::InstanceSource;
use tracing::{debug, error, warn};

use crate::errors::GatewayResponse;
use crate::observability::{UPSTREAM_ERRORS_TOTAL, UPSTREAM_FALLBACK_TOTAL, UPSTREAM_SELECTED_TOTAL};

#[derive(Clone)]
pub struct RoutingState {
    pub balancer: Arc<dyn LoadBalancer>,
    pub discovery: Arc<dyn InstanceSource>,
}

impl RoutingState {
    pub fn new(balancer: Arc<dyn LoadBalancer>, discovery: Arc<dyn InstanceSource>) -> Self {
        Self { balancer, discovery }
    }
}

pub async fn route_request(
    State(state): State<RoutingState>,
    identity: Option<Extension<Identity>>,
    uri: Uri,
) -> Response {
    let candidates = state.discovery.instances();
    let selection = state.balancer.select(&candidates);

    let Some(instance) = selection.instance() else {
        UPSTREAM_ERRORS_TOTAL.inc();
        error!(path = %uri.path(), balancer = state.balancer.name(), candidates = candidates.len(), "no instance available");
        return GatewayResponse::no_instance_available().into_response();
    };

    UPSTREAM_SELECTED_TOTAL.inc();
    let fallback = selection.is_fallback();
    if fallback {
        UPSTREAM_FALLBACK_TOTAL.inc();
        warn!(path = %uri.path(), instance = %instance.id, "no healthy instance, routed by fallback");
    } else {
        debug!(path = %uri.path(), instance = %instance.id, address = %instance.address, "instance selected");
    }

    let data = json!({
        "instance": instance.id,
        "address": instance.address,
        "fallback": fallback,
        "subject": identity.map(|Extension(who)| who.subject),
    });
    (StatusCode::OK, Json(Envelope::new(200, "routed").with_data(data))).into_response()
}
