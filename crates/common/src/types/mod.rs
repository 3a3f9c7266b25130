use serde::{Deserialize, Serialize};

#[derive(Serialize, Debug)]
pub struct Health {
    pub status: &'static str,
}

/// Uniform JSON body returned for every request the edge rejects or answers
/// itself.
///
/// Serialises as `{"code": 401, "message": "...", "data": null, "timestamp": 1700000000000}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    pub code: u16,
    pub message: String,
    pub data: Option<serde_json::Value>,
    /// Epoch milliseconds at which the envelope was built.
    pub timestamp: i64,
}

impl Envelope {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
