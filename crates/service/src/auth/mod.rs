//! Identity verification consumed by the edge authenticator.
//!
//! Token issuance lives elsewhere; this module only verifies bearer tokens
//! and turns their claims into an [`Identity`].

pub mod domain;
pub mod errors;
pub mod verifier;

pub use domain::Identity;
pub use errors::{AuthError, VerifyError};
pub use verifier::{JwtVerifier, TokenVerifier, VerifiedToken};
