use crate::config::Config;
use crate::services::account_service::AccountService;
use crate::services::auth_service::AuthService;
use crate::services::gateway::GatewayService;
use crate::services::health_service::HealthService;
use crate::services::message_service::MessageService;
use crate::services::rate_limit_service::{RateLimitService, RateLimitTier};
use crate::services::user_service::UserService;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, Request, StatusCode, header};
use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod extract;
pub mod gateway;
pub mod health;
pub mod messages;
pub mod middleware;
pub mod schemas;
pub mod users;

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Config,
    pub account_service: AccountService,
    pub auth_service: AuthService,
    pub user_service: UserService,
    pub message_service: MessageService,
    pub gateway_service: GatewayService,
    pub shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Clone, Debug)]
pub struct MgmtState {
    pub health_service: HealthService,
}

#[derive(Debug)]
pub struct ServiceContainer {
    pub account_service: AccountService,
    pub auth_service: AuthService,
    pub user_service: UserService,
    pub message_service: MessageService,
    pub gateway_service: GatewayService,
    pub rate_limit_service: RateLimitService,
}

fn cors_layer(client_url: &str) -> anyhow::Result<CorsLayer> {
    Ok(CorsLayer::new()
        .allow_origin(HeaderValue::from_str(client_url.trim_end_matches('/'))?)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

/// Configures and returns the primary application router.
///
/// # Errors
/// Returns an error if the rate limiter or CORS configuration is invalid.
pub fn app_router(
    config: Config,
    services: ServiceContainer,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<Router> {
    let limiter = &services.rate_limit_service;

    let std_interval_ns = 1_000_000_000 / config.rate_limit.per_second.max(1);
    let standard_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_nanosecond(u64::from(std_interval_ns))
            .burst_size(config.rate_limit.burst)
            .key_extractor(limiter.extractor.clone())
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build standard rate limiter config"))?,
    );

    // Credential tier: signup, federated login and password recovery
    let auth_interval_ns = 1_000_000_000 / config.rate_limit.auth_per_second.max(1);
    let credential_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_nanosecond(u64::from(auth_interval_ns))
            .burst_size(config.rate_limit.auth_burst)
            .key_extractor(limiter.extractor.clone())
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build credential rate limiter config"))?,
    );

    // Login tier: a fixed number of password attempts per window, refilled gradually
    let login_conf = Arc::new(
        GovernorConfigBuilder::default()
            .period(config.rate_limit.login_replenish_period())
            .burst_size(config.rate_limit.login_attempts)
            .key_extractor(limiter.extractor.clone())
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build login rate limiter config"))?,
    );

    let standard_limit =
        GovernorLayer::new(standard_conf).error_handler(limiter.rejection_handler(RateLimitTier::Standard));
    let credential_limit =
        GovernorLayer::new(credential_conf).error_handler(limiter.rejection_handler(RateLimitTier::Credential));
    let login_limit = GovernorLayer::new(login_conf).error_handler(limiter.rejection_handler(RateLimitTier::Login));

    let cors = config.server.client_url.as_deref().map(cors_layer).transpose()?;
    let request_timeout = Duration::from_secs(config.server.request_timeout_secs);
    // Images arrive base64-encoded inside JSON bodies.
    let body_limit = config.storage.max_image_bytes / 3 * 4 + 64 * 1024;

    let state = AppState {
        config,
        account_service: services.account_service,
        auth_service: services.auth_service,
        user_service: services.user_service,
        message_service: services.message_service,
        gateway_service: services.gateway_service,
        shutdown_rx,
    };

    let login_routes = Router::new().route("/auth/login", post(auth::login)).layer(login_limit);

    // Sensitive routes with strict limits
    let credential_routes = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/google", post(auth::google))
        .route("/auth/forget", post(auth::forget))
        .route("/auth/reset/{token}", post(auth::reset))
        .layer(credential_limit);

    // Standard routes
    let api_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/check", get(auth::check))
        .route("/auth/update-profile", put(auth::update_profile))
        .route("/auth/verify-email", get(auth::verify_email))
        .route("/auth/send-verification", post(auth::send_verification))
        .route("/auth/delete-account", delete(auth::delete_account))
        .route("/users", get(users::list_contacts))
        .route("/users/{id}", get(users::get_user))
        .route("/messages/send/{id}", post(messages::send_message))
        .route("/messages/seen/{senderId}", patch(messages::mark_seen))
        .route(
            "/messages/{id}",
            get(messages::list_thread).put(messages::update_message).delete(messages::delete_message),
        )
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .route("/gateway", get(gateway::websocket_handler))
        .layer(standard_limit);

    let router = Router::new()
        .nest("/api/v1", login_routes.merge(credential_routes).merge(api_routes))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(PropagateRequestIdLayer::new(axum::http::HeaderName::from_static("x-request-id")))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<tower_http::request_id::RequestId>()
                        .map(|id| id.header_value().to_str().unwrap_or_default())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                        "user_id" = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        let status = response.status();
                        tracing::Span::current().record("http.response.status_code", status.as_u16());

                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %status.as_u16(),
                            "request completed"
                        );
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(
            axum::http::HeaderName::from_static("x-request-id"),
            middleware::MakeRequestUuidOrHeader,
        ));

    let router = match cors {
        Some(cors) => router.layer(cors),
        None => router,
    };

    Ok(router.with_state(state))
}

pub fn mgmt_router(state: MgmtState) -> Router {
    Router::new().route("/livez", get(health::livez)).route("/readyz", get(health::readyz)).with_state(state)
}
