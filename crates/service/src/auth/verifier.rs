use std::collections::HashSet;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use super::errors::VerifyError;

/// Claims read out of a token whose signature has been checked.
///
/// Every field is optional here; deciding what is mandatory is the
/// authenticator's job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: Option<String>,
    pub user_type: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Bearer token verification collaborator.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
    #[serde(rename = "userType")]
    user_type: Option<String>,
    exp: Option<i64>,
}

/// HS256 verifier checking signature and issuer.
///
/// Expiry is intentionally not validated here, the authenticator checks it
/// against its own clock as a separate step.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str, issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();
        validation.set_issuer(&[issuer]);
        Self { key: DecodingKey::from_secret(secret.as_bytes()), validation }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                VerifyError::Malformed(e.to_string())
            }
            _ => VerifyError::Rejected(e.to_string()),
        })?;
        let claims = data.claims;
        Ok(VerifiedToken {
            subject: claims.sub,
            user_type: claims.user_type,
            expires_at: claims.exp.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        })
    }
}
