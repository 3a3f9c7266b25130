use std::net::SocketAddr;
use std::time::Instant;

use axum::http::{HeaderMap, Method};
use service::auth::Identity;
use uuid::Uuid;

/// Per-request state threaded through the filter chain.
///
/// Built when a request enters the edge and dropped once its response has
/// been logged. Nothing in it is shared with other requests.
#[derive(Debug)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub client_ip: String,
    /// Set by the logging filter on entry.
    pub started_at: Option<Instant>,
    identity: Option<Identity>,
    /// Number of filters whose `on_request` has run.
    pub(crate) reached: usize,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap, peer: Option<SocketAddr>) -> Self {
        let client_ip = resolve_client_ip(&headers, peer);
        Self {
            request_id: Uuid::new_v4(),
            method,
            path: path.into(),
            headers,
            client_ip,
            started_at: None,
            identity: None,
            reached: 0,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Attach the authenticated identity. The first identity wins; returns
    /// false if one was already attached.
    pub fn attach_identity(&mut self, identity: Identity) -> bool {
        if self.identity.is_some() {
            return false;
        }
        self.identity = Some(identity);
        true
    }
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }
    peer.map(|p| p.ip().to_string()).unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_static(v));
        }
        h
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let h = headers(&[("x-forwarded-for", " 203.0.113.9 , 10.0.0.1"), ("x-real-ip", "10.9.9.9")]);
        assert_eq!(resolve_client_ip(&h, None), "203.0.113.9");
    }

    #[test]
    fn real_ip_then_peer_then_unknown() {
        let peer: SocketAddr = "192.0.2.4:5555".parse().unwrap();
        assert_eq!(resolve_client_ip(&headers(&[("x-real-ip", "10.9.9.9")]), Some(peer)), "10.9.9.9");
        assert_eq!(resolve_client_ip(&HeaderMap::new(), Some(peer)), "192.0.2.4");
        assert_eq!(resolve_client_ip(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn identity_is_attached_once() {
        let mut ctx = RequestContext::new(Method::GET, "/api/order", HeaderMap::new(), None);
        let who = Identity { subject: "u1".into(), user_type: "user".into(), expires_at: Utc::now() };
        assert!(ctx.attach_identity(who.clone()));
        let other = Identity { subject: "u2".into(), ..who };
        assert!(!ctx.attach_identity(other));
        assert_eq!(ctx.identity().unwrap().subject, "u1");
    }
}
