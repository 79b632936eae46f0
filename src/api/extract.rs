//! Request extractors whose failures are reported through [`AppError`].
//!
//! Axum's stock extractors answer malformed input with a plain-text body that
//! echoes parser internals. These wrappers delegate to them and map the
//! rejection onto the JSON error envelope instead.

use crate::error::AppError;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// JSON request body, also usable as a JSON response.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Path<T>(pub T);

impl<T, S> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Path(value) = axum::extract::Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Query<T>(pub T);

impl<T, S> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Query(value) = axum::extract::Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(reason = %rejection.body_text(), "Rejected request body");
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge;
        }
        match rejection {
            JsonRejection::MissingJsonContentType(_) => Self::Validation("Expected a JSON request body".to_string()),
            _ => Self::Validation("Malformed request body".to_string()),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        match rejection {
            PathRejection::MissingPathParams(e) => {
                tracing::error!(error = %e, "Route is missing its path parameters");
                Self::Internal
            }
            other => {
                tracing::debug!(reason = %other.body_text(), "Rejected path parameters");
                Self::Validation("Invalid path parameter".to_string())
            }
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!(reason = %rejection.body_text(), "Rejected query string");
        Self::Validation("Invalid query string".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::header;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        text: String,
    }

    async fn error_body(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_malformed_json_maps_to_validation() {
        let req = Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let err = Json::<Payload>::from_request(req, &()).await.unwrap_err();
        let (status, body) = error_body(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Malformed request body");
    }

    #[tokio::test]
    async fn test_missing_content_type_maps_to_validation() {
        let req = Request::builder().method("POST").body(Body::from(r#"{"text":"hi"}"#)).unwrap();

        let err = Json::<Payload>::from_request(req, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Expected a JSON request body"));
    }

    #[tokio::test]
    async fn test_valid_json_is_extracted() {
        let req = Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"text":"hi"}"#))
            .unwrap();

        let Json(payload) = Json::<Payload>::from_request(req, &()).await.unwrap();
        assert_eq!(payload.text, "hi");
    }

    #[tokio::test]
    async fn test_bad_query_maps_to_validation() {
        #[derive(Debug, Deserialize)]
        struct Params {
            #[allow(dead_code)]
            token: String,
        }
        let (mut parts, ()) = Request::builder().uri("/verify?other=1").body(()).unwrap().into_parts();

        let err = Query::<Params>::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Invalid query string"));
    }
}
