use crate::api::AppState;
use crate::api::extract::{Json, Path, Query};
use crate::api::middleware::AuthUser;
use crate::api::schemas::ActionResponse;
use crate::api::schemas::auth::{
    ForgotPassword, GoogleLogin, Login, ProfileUpdate, ResetPassword, Signup, VerifyEmailParams,
};
use crate::domain::user::UserProfile;
use crate::error::Result;
use crate::services::account_service::AuthSession;
use axum::{
    extract::State,
    http::{HeaderName, StatusCode, header},
    response::IntoResponse,
};

type SessionResponse = (StatusCode, [(HeaderName, String); 1], Json<UserProfile>);

fn session_response(state: &AppState, status: StatusCode, session: AuthSession) -> SessionResponse {
    let cookie = state.auth_service.session_cookie(session.token);
    (status, [(header::SET_COOKIE, cookie.to_string())], Json(session.user))
}

pub async fn signup(State(state): State<AppState>, Json(payload): Json<Signup>) -> Result<impl IntoResponse> {
    let session = state.account_service.signup(&payload.full_name, &payload.email, &payload.password).await?;
    Ok(session_response(&state, StatusCode::CREATED, session))
}

pub async fn login(State(state): State<AppState>, Json(payload): Json<Login>) -> Result<impl IntoResponse> {
    let session = state.account_service.login(&payload.email, &payload.password).await?;
    Ok(session_response(&state, StatusCode::OK, session))
}

pub async fn google(State(state): State<AppState>, Json(payload): Json<GoogleLogin>) -> Result<impl IntoResponse> {
    let session = state.account_service.google(&payload.id_token).await?;
    Ok(session_response(&state, StatusCode::OK, session))
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = state.auth_service.clear_session_cookie();
    ([(header::SET_COOKIE, cookie.to_string())], Json(ActionResponse::ok("Logged out successfully")))
}

pub async fn check(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let profile = state.account_service.check(auth_user.user_id).await?;
    Ok(Json(profile))
}

pub async fn update_profile(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ProfileUpdate>,
) -> Result<impl IntoResponse> {
    let profile = state
        .account_service
        .update_profile(auth_user.user_id, payload.full_name, payload.profile_pic, payload.bio)
        .await?;
    Ok(Json(profile))
}

pub async fn forget(State(state): State<AppState>, Json(payload): Json<ForgotPassword>) -> Result<impl IntoResponse> {
    state.account_service.forget(&payload.email).await?;
    Ok(Json(ActionResponse::ok("Password reset link sent to your email")))
}

pub async fn reset(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPassword>,
) -> Result<impl IntoResponse> {
    state.account_service.reset(&token, &payload.password).await?;
    Ok(Json(ActionResponse::ok("Password has been reset")))
}

pub async fn send_verification(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.account_service.send_verification(auth_user.user_id).await?;
    Ok(Json(ActionResponse::ok("Verification email sent")))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(params): Query<VerifyEmailParams>,
) -> Result<impl IntoResponse> {
    state.account_service.verify_email(&params.token).await?;
    Ok(Json(ActionResponse::ok("Email verified")))
}

pub async fn delete_account(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.account_service.delete_account(auth_user.user_id).await?;
    let cookie = state.auth_service.clear_session_cookie();
    Ok(([(header::SET_COOKIE, cookie.to_string())], Json(ActionResponse::ok("Account deleted"))))
}
