//! Filters registered on the edge chain, lowest order first.

pub mod auth;
pub mod logging;
pub mod rate_limit;

pub use auth::{AuthOutcome, Authenticator};
pub use logging::RequestLogger;
pub use rate_limit::{Admission, RateLimiter};

pub const LOGGING_ORDER: i32 = -300;
pub const RATE_LIMIT_ORDER: i32 = -200;
pub const AUTH_ORDER: i32 = -100;
