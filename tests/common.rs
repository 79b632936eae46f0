#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    unreachable_pub,
    dead_code
)]

use clap::Parser;
use futures::{SinkExt, StreamExt};
use parley_server::AppBuilder;
use parley_server::adapters::identity::{FederatedIdentity, FixedIdentityVerifier};
use parley_server::adapters::mail::RecordingMailer;
use parley_server::api::{MgmtState, app_router, mgmt_router};
use parley_server::config::Config;
use reqwest::StatusCode;
use reqwest::header::{COOKIE, SET_COOKIE};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

static INIT: Once = Once::new();

pub const GOOGLE_TOKEN: &str = "google-test-token";
pub const GOOGLE_EMAIL: &str = "grace@google.test";

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("parley_server=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap())
            .add_directive("tungstenite=warn".parse().unwrap());

        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}

pub fn get_test_config() -> Config {
    Config::try_parse_from([
        "parley-server",
        "--database-url",
        "postgres://unused/parley",
        "--jwt-secret",
        "test_secret",
        "--host",
        "127.0.0.1",
        "--port",
        "0",
        "--mgmt-port",
        "0",
        "--rate-limit-per-second",
        "10000",
        "--rate-limit-burst",
        "10000",
        "--auth-per-second",
        "10000",
        "--auth-burst",
        "10000",
        "--login-attempts",
        "10000",
        "--app-url",
        "http://app.test",
        "--public-url",
        "http://media.test/parley",
        "--max-image-bytes",
        "65536",
    ])
    .unwrap()
}

pub fn generate_email(prefix: &str) -> String {
    let run_id = &Uuid::new_v4().simple().to_string()[..8];
    format!("{prefix}_{run_id}@example.com")
}

/// Pulls a URL-safe token out of an email body following `marker`.
pub fn token_from(html: &str, marker: &str) -> String {
    let start = html.find(marker).unwrap() + marker.len();
    html[start..].chars().take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_').collect()
}

/// Turns a `Set-Cookie` header into the `Cookie` header value a browser would send back.
pub fn session_cookie(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("token="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub cookie: String,
}

pub struct TestApp {
    pub server_url: String,
    pub ws_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub config: Config,
    pub mailer: RecordingMailer,
    pub shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(get_test_config()).await
    }

    pub async fn spawn_with_config(config: Config) -> Self {
        setup_tracing();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mailer = RecordingMailer::new();
        let identity = FixedIdentityVerifier::new().with_token(
            GOOGLE_TOKEN,
            FederatedIdentity { email: GOOGLE_EMAIL.to_string(), name: "Grace".to_string(), picture: None },
        );

        let app = AppBuilder::new(config.clone())
            .with_mailer(Arc::new(mailer.clone()))
            .with_identity_verifier(Arc::new(identity))
            .build();

        let router = app_router(config.clone(), app.services, shutdown_rx.clone()).unwrap();
        let mgmt = mgmt_router(MgmtState { health_service: app.health_service });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mgmt_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_addr = mgmt_listener.local_addr().unwrap();

        let mut api_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let _ = api_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt.into_make_service_with_connect_info::<SocketAddr>()).await.unwrap();
        });

        Self {
            server_url: format!("http://{addr}/api/v1"),
            ws_url: format!("ws://{addr}/api/v1/gateway"),
            mgmt_url: format!("http://{mgmt_addr}"),
            client: reqwest::Client::new(),
            config,
            mailer,
            shutdown_tx,
        }
    }

    pub async fn signup(&self, full_name: &str, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/auth/signup", self.server_url))
            .json(&json!({ "fullName": full_name, "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/auth/login", self.server_url))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    pub async fn register_user(&self, prefix: &str) -> TestUser {
        let email = generate_email(prefix);
        let resp = self.signup(prefix, &email, "password123").await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let cookie = session_cookie(&resp).expect("signup must set a session cookie");
        let body: Value = resp.json().await.unwrap();
        let id = Uuid::parse_str(body["id"].as_str().unwrap()).unwrap();

        TestUser { id, email, cookie }
    }

    pub async fn send_text(&self, from: &TestUser, to: Uuid, text: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/messages/send/{to}", self.server_url))
            .header(COOKIE, &from.cookie)
            .json(&json!({ "text": text }))
            .send()
            .await
            .unwrap()
    }

    pub async fn connect_ws(&self, user_id: Uuid) -> WsClient {
        let url = format!("{}?userId={user_id}", self.ws_url);
        let (stream, _) = tokio_tungstenite::connect_async(url).await.expect("Failed to connect WebSocket");
        WsClient { stream }
    }
}

pub struct WsClient {
    pub stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn receive_raw_timeout(
        &mut self,
        timeout: Duration,
    ) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
        tokio::time::timeout(timeout, self.stream.next()).await.ok().flatten()
    }

    /// Waits for the next event named `name`, skipping any other frames.
    pub async fn wait_for_event(&mut self, name: &str, timeout: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match self.receive_raw_timeout(remaining).await {
                Some(Ok(Message::Text(text))) => {
                    let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                    if frame["event"] == name {
                        return Some(frame["data"].clone());
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return None,
            }
        }
    }

    /// Waits until a presence broadcast contains exactly `expected`, in any order.
    pub async fn wait_for_online(&mut self, expected: &[Uuid], timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut expected: Vec<String> = expected.iter().map(ToString::to_string).collect();
        expected.sort();
        while let Some(data) =
            self.wait_for_event("getOnlineUsers", deadline.saturating_duration_since(tokio::time::Instant::now())).await
        {
            let mut online: Vec<String> =
                data.as_array().unwrap().iter().map(|v| v.as_str().unwrap().to_string()).collect();
            online.sort();
            if online == expected {
                return true;
            }
        }
        false
    }

    pub async fn send_event(&mut self, frame: Value) {
        self.stream.send(Message::text(frame.to_string())).await.unwrap();
    }
}
