use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use configs::AuthConfig;
use service::auth::{AuthError, Identity, TokenVerifier};
use tracing::{debug, info, warn};

use super::AUTH_ORDER;
use crate::chain::{Filter, FilterAction};
use crate::context::RequestContext;
use crate::errors::GatewayResponse;
use crate::observability::AUTH_REJECTED_TOTAL;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Path is on the exclusion list; headers were not inspected.
    Bypassed,
    Authenticated(Identity),
    Rejected(AuthError),
}

/// Bearer token gate. Fail-closed: anything short of a verified, unexpired
/// token carrying both user claims is a 401.
#[derive(Clone)]
pub struct Authenticator {
    verifier: Arc<dyn TokenVerifier>,
    header: String,
    prefix: String,
    exclude_paths: Arc<Vec<String>>,
    clock: fn() -> DateTime<Utc>,
}

impl Authenticator {
    pub fn new(verifier: Arc<dyn TokenVerifier>, cfg: &AuthConfig) -> Self {
        Self {
            verifier,
            header: cfg.header.clone(),
            prefix: cfg.prefix.clone(),
            exclude_paths: Arc::new(cfg.exclude_paths.clone()),
            clock: Utc::now,
        }
    }

    /// Replace the wall clock used for the expiry check.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude_paths
            .iter()
            .any(|p| path.starts_with(p.as_str()) || path.contains(p.as_str()))
    }

    fn bearer<'a>(&self, ctx: &'a RequestContext) -> Option<&'a str> {
        ctx.header(&self.header)
            .and_then(|v| v.strip_prefix(self.prefix.as_str()))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn authenticate(&self, ctx: &mut RequestContext) -> AuthOutcome {
        if self.is_excluded(&ctx.path) {
            debug!(path = %ctx.path, "path excluded from authentication");
            return AuthOutcome::Bypassed;
        }
        match self.check(ctx) {
            Ok(identity) => {
                info!(subject = %identity.subject, user_type = %identity.user_type, path = %ctx.path, "request authenticated");
                ctx.attach_identity(identity.clone());
                AuthOutcome::Authenticated(identity)
            }
            Err(reason) => {
                warn!(path = %ctx.path, reason = reason.reason(), "authentication rejected: {reason}");
                AuthOutcome::Rejected(reason)
            }
        }
    }

    fn check(&self, ctx: &RequestContext) -> Result<Identity, AuthError> {
        let token = self.bearer(ctx).ok_or(AuthError::MissingHeader)?;
        let verified = self.verifier.verify(token).map_err(|e| {
            debug!(path = %ctx.path, error = %e, "token verification failed");
            AuthError::InvalidToken
        })?;

        let expires_at = verified.expires_at.ok_or(AuthError::MissingClaims)?;
        // valid through its expiry instant
        if expires_at < (self.clock)() {
            return Err(AuthError::ExpiredToken);
        }

        let subject = non_blank(verified.subject).ok_or(AuthError::MissingClaims)?;
        let user_type = non_blank(verified.user_type).ok_or(AuthError::MissingClaims)?;
        Ok(Identity { subject, user_type, expires_at })
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

#[async_trait]
impl Filter for Authenticator {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn order(&self) -> i32 {
        AUTH_ORDER
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterAction {
        match self.authenticate(ctx) {
            AuthOutcome::Rejected(reason) => {
                AUTH_REJECTED_TOTAL.with_label_values(&[reason.reason()]).inc();
                FilterAction::Respond(GatewayResponse::unauthorized(reason))
            }
            _ => FilterAction::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue, Method};
    use chrono::{Duration, TimeZone};
    use service::auth::{VerifiedToken, VerifyError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts "good", "nosub", "noexp", "boundary", "stale"; anything else is rejected.
    #[derive(Default)]
    struct StubVerifier {
        calls: AtomicUsize,
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    impl TokenVerifier for StubVerifier {
        fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let good = VerifiedToken {
                subject: Some("13800000000".into()),
                user_type: Some("user".into()),
                expires_at: Some(fixed_now() + Duration::hours(1)),
            };
            match token {
                "good" => Ok(good),
                "nosub" => Ok(VerifiedToken { subject: Some("  ".into()), ..good }),
                "noexp" => Ok(VerifiedToken { expires_at: None, ..good }),
                "boundary" => Ok(VerifiedToken { expires_at: Some(fixed_now()), ..good }),
                "stale" => Ok(VerifiedToken { expires_at: Some(fixed_now() - Duration::seconds(1)), ..good }),
                _ => Err(VerifyError::Rejected("bad signature".into())),
            }
        }
    }

    fn setup() -> (Authenticator, Arc<StubVerifier>) {
        let verifier = Arc::new(StubVerifier::default());
        let auth = Authenticator::new(verifier.clone(), &AuthConfig::default()).with_clock(fixed_now);
        (auth, verifier)
    }

    fn ctx(path: &str, authorization: Option<&'static str>) -> RequestContext {
        let mut headers = HeaderMap::new();
        if let Some(v) = authorization {
            headers.insert("authorization", HeaderValue::from_static(v));
        }
        RequestContext::new(Method::GET, path, headers, None)
    }

    #[test]
    fn valid_token_attaches_identity() {
        let (auth, _) = setup();
        let mut ctx = ctx("/api/order/list", Some("Bearer good"));
        let AuthOutcome::Authenticated(who) = auth.authenticate(&mut ctx) else {
            panic!("expected authenticated");
        };
        assert_eq!(who.subject, "13800000000");
        assert_eq!(who.user_type, "user");
        assert_eq!(ctx.identity(), Some(&who));
    }

    #[test]
    fn excluded_paths_never_reach_the_verifier() {
        let (auth, verifier) = setup();
        for path in ["/api/user/login", "/api/business/42", "/prefix/swagger-ui/index.html", "/health"] {
            let mut ctx = ctx(path, Some("Bearer forged"));
            assert_eq!(auth.authenticate(&mut ctx), AuthOutcome::Bypassed, "{path}");
            assert!(ctx.identity().is_none());
        }
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_or_non_bearer_header() {
        let (auth, verifier) = setup();
        assert_eq!(auth.authenticate(&mut ctx("/api/order", None)), AuthOutcome::Rejected(AuthError::MissingHeader));
        assert_eq!(
            auth.authenticate(&mut ctx("/api/order", Some("Basic dXNlcjpwYXNz"))),
            AuthOutcome::Rejected(AuthError::MissingHeader)
        );
        assert_eq!(auth.authenticate(&mut ctx("/api/order", Some("Bearer "))), AuthOutcome::Rejected(AuthError::MissingHeader));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_verification_is_invalid_token() {
        let (auth, _) = setup();
        assert_eq!(
            auth.authenticate(&mut ctx("/api/order", Some("Bearer forged"))),
            AuthOutcome::Rejected(AuthError::InvalidToken)
        );
    }

    #[test]
    fn expired_token_is_rejected_despite_valid_signature() {
        let (auth, _) = setup();
        let mut ctx = ctx("/api/order", Some("Bearer stale"));
        assert_eq!(auth.authenticate(&mut ctx), AuthOutcome::Rejected(AuthError::ExpiredToken));
        assert!(ctx.identity().is_none());
    }

    #[test]
    fn token_is_valid_at_its_expiry_instant() {
        let (auth, _) = setup();
        let mut ctx = ctx("/api/order", Some("Bearer boundary"));
        assert!(matches!(auth.authenticate(&mut ctx), AuthOutcome::Authenticated(_)));
    }

    #[test]
    fn missing_claims() {
        let (auth, _) = setup();
        assert_eq!(auth.authenticate(&mut ctx("/api/order", Some("Bearer nosub"))), AuthOutcome::Rejected(AuthError::MissingClaims));
        assert_eq!(auth.authenticate(&mut ctx("/api/order", Some("Bearer noexp"))), AuthOutcome::Rejected(AuthError::MissingClaims));
    }

    #[tokio::test]
    async fn filter_answers_rejections_with_401() {
        let (auth, _) = setup();
        let mut ctx = ctx("/api/order", None);
        match auth.on_request(&mut ctx).await {
            FilterAction::Respond(res) => {
                assert_eq!(res.status.as_u16(), 401);
                assert_eq!(res.envelope.message, "missing authorization header");
            }
            FilterAction::Continue => panic!("expected rejection"),
        }
    }
}
