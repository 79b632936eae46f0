use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::services::auth_service::{AuthService, SESSION_COOKIE};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, Request, header, request::Parts},
};
use cookie::Cookie;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// The caller identified by a valid session token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user_id = session_user(&parts.headers, &state.auth_service)?;
        tracing::Span::current().record("user_id", tracing::field::display(user_id));
        Ok(Self { user_id })
    }
}

/// Resolves the session token from the `token` cookie, falling back to an
/// `Authorization: Bearer` header.
///
/// # Errors
/// Returns `AppError::Authentication` if no valid token is present.
pub fn session_user(headers: &HeaderMap, auth: &AuthService) -> Result<Uuid> {
    let token = session_cookie(headers).or_else(|| bearer_token(headers)).ok_or_else(AppError::unauthenticated)?;
    auth.verify_token(&token)
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(std::result::Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE && !cookie.value().is_empty())
        .map(|cookie| cookie.value().to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(|token| token.trim().to_string()).filter(|token| !token.is_empty())
}

/// Keeps a client-supplied `x-request-id` when it is a sane length, otherwise
/// generates a UUID.
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeRequestUuidOrHeader;

impl MakeRequestId for MakeRequestUuidOrHeader {
    fn make_request_id<B>(&mut self, request: &Request<B>) -> Option<RequestId> {
        if let Some(existing) = request.headers().get("x-request-id")
            && !existing.is_empty()
            && existing.len() <= 128
        {
            return Some(RequestId::new(existing.clone()));
        }

        HeaderValue::from_str(&Uuid::new_v4().to_string()).ok().map(RequestId::new)
    }
}
