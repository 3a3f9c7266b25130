use thiserror::Error;

/// Reasons the authenticator turns a request away. All of them map to 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingHeader,
    #[error("token verification failed")]
    InvalidToken,
    #[error("token expired")]
    ExpiredToken,
    #[error("token is missing user claims")]
    MissingClaims,
}

impl AuthError {
    /// HTTP status and envelope code.
    pub fn status(&self) -> u16 {
        401
    }

    /// Short label used in logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "missing_header",
            AuthError::InvalidToken => "invalid_token",
            AuthError::ExpiredToken => "expired_token",
            AuthError::MissingClaims => "missing_claims",
        }
    }
}

/// Failure reported by a [`crate::auth::TokenVerifier`].
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("bad signature or issuer: {0}")]
    Rejected(String),
}
