use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::types::Envelope;
use service::auth::AuthError;

/// Terminal response produced at the edge, rendered as the uniform envelope.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub envelope: Envelope,
}

impl GatewayResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, envelope: Envelope::new(status.as_u16(), message) }
    }

    pub fn unauthorized(err: AuthError) -> Self {
        Self::new(StatusCode::from_u16(err.status()).unwrap_or(StatusCode::UNAUTHORIZED), err.to_string())
    }

    pub fn too_many_requests() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "too many requests, please retry later")
    }

    pub fn no_instance_available() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "no instance available")
    }
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}
