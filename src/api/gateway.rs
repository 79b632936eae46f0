use crate::api::AppState;
use crate::api::extract::Query;
use crate::api::middleware::session_user;
use crate::error::AppError;
use axum::{
    extract::{State, ws::WebSocketUpgrade},
    http::{Extensions, HeaderMap},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tower_http::request_id::RequestId;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    extensions: Extensions,
    State(state): State<AppState>,
) -> Response {
    let request_id = extensions
        .get::<RequestId>()
        .map(|id| id.header_value().to_str().unwrap_or_default().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let Some(user_id) = params.user_id.as_deref().and_then(|raw| Uuid::parse_str(raw).ok()) else {
        tracing::warn!("WebSocket handshake failed: missing or invalid userId");
        return AppError::Validation("A valid userId is required".to_string()).into_response();
    };

    if state.config.websocket.verify_session {
        match session_user(&headers, &state.auth_service) {
            Ok(session_user_id) if session_user_id == user_id => {}
            Ok(_) => {
                tracing::warn!(%user_id, "WebSocket handshake failed: session does not match userId");
                return AppError::unauthenticated().into_response();
            }
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket handshake failed: invalid session");
                return e.into_response();
            }
        }
    }

    let gateway = state.gateway_service.clone();
    let shutdown_rx = state.shutdown_rx.clone();
    ws.on_upgrade(move |socket| async move {
        gateway.handle_socket(socket, user_id, request_id, shutdown_rx).await;
    })
}
