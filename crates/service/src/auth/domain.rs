use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated caller, attached to the request context once a token has
/// passed both the signature and the expiry check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub user_type: String,
    pub expires_at: DateTime<Utc>,
}

