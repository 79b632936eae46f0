pub mod auth;
pub mod health;
pub mod messages;

use serde::Serialize;

/// Acknowledgement body for operations without a resource to return. Shares
/// its shape with error responses.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

impl ActionResponse {
    #[must_use]
    pub fn ok(message: &str) -> Self {
        Self { success: true, message: message.to_string() }
    }
}
