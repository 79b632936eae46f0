use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Request body too large")]
    PayloadTooLarge,
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Upstream service failed: {0}")]
    Upstream(String),
    #[error("Internal server error")]
    Internal,
}

impl AppError {
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::Authentication("Unauthorized".to_string())
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Database(e) => {
                tracing::error!(error = %e, "Database error");
                "Internal server error".to_string()
            }
            Self::Validation(msg) => {
                tracing::debug!(message = %msg, "Validation failed");
                msg
            }
            Self::Authentication(msg) => {
                tracing::debug!(message = %msg, "Authentication failed");
                msg
            }
            Self::Forbidden(msg) => {
                tracing::debug!(message = %msg, "Forbidden");
                msg
            }
            Self::NotFound(msg) => {
                tracing::debug!(message = %msg, "Resource not found");
                msg
            }
            Self::Conflict(msg) => {
                tracing::debug!(message = %msg, "Conflict");
                msg
            }
            Self::PayloadTooLarge => {
                tracing::debug!("Request body too large");
                "Request body too large".to_string()
            }
            Self::RateLimited(msg) => msg,
            Self::Upstream(msg) => {
                tracing::error!(message = %msg, "Upstream service failed");
                "Upstream service unavailable".to_string()
            }
            Self::Internal => {
                tracing::error!("Internal server error occurred");
                "Internal server error".to_string()
            }
        };

        let body = Json(json!({
            "success": false,
            "message": message
        }));

        (status, body).into_response()
    }
}
