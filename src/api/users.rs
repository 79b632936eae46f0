use crate::api::AppState;
use crate::api::extract::{Json, Path};
use crate::api::middleware::AuthUser;
use crate::error::Result;
use axum::{
    extract::State,
    response::IntoResponse,
};
use uuid::Uuid;

pub async fn list_contacts(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let contacts = state.user_service.list_contacts(auth_user.user_id).await?;
    Ok(Json(contacts))
}

pub async fn get_user(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let profile = state.user_service.get_user(user_id).await?;
    Ok(Json(profile))
}
