use crate::api::AppState;
use crate::api::extract::{Json, Path};
use crate::api::middleware::AuthUser;
use crate::api::schemas::messages::{DeletedMessage, MessageContent, SeenResponse};
use crate::error::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

pub async fn list_thread(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(other_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let messages = state.message_service.list_thread(auth_user.user_id, other_id).await?;
    Ok(Json(messages))
}

pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(receiver_id): Path<Uuid>,
    Json(payload): Json<MessageContent>,
) -> Result<impl IntoResponse> {
    let message = state.message_service.send(auth_user.user_id, receiver_id, payload.text, payload.image).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn update_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Json(payload): Json<MessageContent>,
) -> Result<impl IntoResponse> {
    let message = state.message_service.update(message_id, auth_user.user_id, payload.text, payload.image).await?;
    Ok(Json(message))
}

pub async fn delete_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let id = state.message_service.delete(message_id, auth_user.user_id).await?;
    Ok(Json(DeletedMessage { id }))
}

pub async fn mark_seen(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(sender_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let count = state.message_service.mark_seen(auth_user.user_id, sender_id).await?;
    Ok(Json(SeenResponse { success: true, count }))
}
