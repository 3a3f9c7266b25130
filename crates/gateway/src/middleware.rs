use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use service::auth::Identity;
use tracing::{debug, warn};

use crate::chain::{ChainOutcome, FilterChain};
use crate::context::RequestContext;

pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");
pub const USER_TYPE_HEADER: HeaderName = HeaderName::from_static("x-user-type");

/// Status recorded when the client goes away before a response exists.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Completes the chain exactly once, on drop. Without a final status the
/// request was abandoned mid-flight.
struct InFlight {
    chain: FilterChain,
    ctx: RequestContext,
    status: Option<StatusCode>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let status = match self.status {
            Some(status) => status,
            None => {
                debug!(request_id = %self.ctx.request_id, path = %self.ctx.path, "request dropped before completion");
                StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::REQUEST_TIMEOUT)
            }
        };
        self.chain.complete(&self.ctx, status);
    }
}

/// Runs the filter chain around the inner service.
///
/// Identity headers sent by the client are dropped before the chain runs, so
/// only the authenticator can set them on the forwarded request.
pub async fn filter_chain_middleware(State(chain): State<FilterChain>, mut req: Request, next: Next) -> Response {
    let peer = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0);
    strip_identity_headers(req.headers_mut());

    let ctx = RequestContext::new(req.method().clone(), req.uri().path(), req.headers().clone(), peer);
    let mut in_flight = InFlight { chain, ctx, status: None };
    let response = match in_flight.chain.run(&mut in_flight.ctx).await {
        ChainOutcome::ShortCircuit { response, .. } => response.into_response(),
        ChainOutcome::Forward => {
            if let Some(identity) = in_flight.ctx.identity() {
                forward_identity(&mut req, identity);
            }
            next.run(req).await
        }
    };

    in_flight.status = Some(response.status());
    response
}

fn strip_identity_headers(headers: &mut HeaderMap) {
    headers.remove(USER_ID_HEADER);
    headers.remove(USER_TYPE_HEADER);
}

fn forward_identity(req: &mut Request, identity: &Identity) {
    for (name, value) in [(USER_ID_HEADER, &identity.subject), (USER_TYPE_HEADER, &identity.user_type)] {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                req.headers_mut().insert(name, v);
            }
            Err(_) => warn!(header = %name, "claim is not a valid header value, not forwarded"),
        }
    }
    req.extensions_mut().insert(identity.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::routing::get;
    use axum::{middleware, Router};
    use tower::ServiceExt;

    use crate::chain::{Filter, FilterAction};

    #[derive(Clone, Default)]
    struct Recorder {
        completed: Arc<Mutex<Vec<u16>>>,
    }

    #[async_trait]
    impl Filter for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }
        fn order(&self) -> i32 {
            0
        }
        async fn on_request(&self, _ctx: &mut RequestContext) -> FilterAction {
            FilterAction::Continue
        }
        fn on_complete(&self, _ctx: &RequestContext, status: StatusCode) {
            self.completed.lock().unwrap().push(status.as_u16());
        }
    }

    fn app(recorder: &Recorder) -> Router {
        let chain = FilterChain::builder().with(recorder.clone()).build();
        Router::new()
            .route("/fast", get(|| async { "ok" }))
            .route("/stuck", get(|| async { std::future::pending::<()>().await }))
            .layer(middleware::from_fn_with_state(chain, filter_chain_middleware))
    }

    fn get_req(path: &str) -> Request {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn completes_once_with_final_status() {
        let recorder = Recorder::default();
        let res = app(&recorder).oneshot(get_req("/fast")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(*recorder.completed.lock().unwrap(), vec![200]);
    }

    #[tokio::test]
    async fn abandoned_request_still_completes() {
        let recorder = Recorder::default();
        let pending = app(&recorder).oneshot(get_req("/stuck"));
        assert!(tokio::time::timeout(Duration::from_millis(20), pending).await.is_err());
        assert_eq!(*recorder.completed.lock().unwrap(), vec![CLIENT_CLOSED_REQUEST]);
    }

    #[tokio::test]
    async fn inbound_identity_headers_are_stripped() {
        let recorder = Recorder::default();
        let chain = FilterChain::builder().with(recorder).build();
        let app = Router::new()
            .route(
                "/echo",
                get(|headers: HeaderMap| async move { headers.contains_key(USER_ID_HEADER).to_string() }),
            )
            .layer(middleware::from_fn_with_state(chain, filter_chain_middleware));
        let req = Request::builder().uri("/echo").header("x-user-id", "admin").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"false");
    }
}
