#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;

use crate::adapters::database::{DbPool, MessageRepository, UserRepository};
use crate::adapters::identity::{DisabledIdentityVerifier, IdentityVerifier};
use crate::adapters::mail::{LogMailer, Mailer};
use crate::adapters::memory::InMemoryStore;
use crate::adapters::storage::{MemoryStorage, ObjectStorage};
use crate::api::ServiceContainer;
use crate::config::Config;
use crate::services::account_service::AccountService;
use crate::services::auth_service::AuthService;
use crate::services::gateway::GatewayService;
use crate::services::gateway::registry::ConnectionRegistry;
use crate::services::health_service::HealthService;
use crate::services::media_service::MediaService;
use crate::services::message_service::MessageService;
use crate::services::rate_limit_service::RateLimitService;
use crate::services::user_service::UserService;
use std::sync::Arc;
use tokio::sync::watch;

/// Everything the binary needs to serve: the API services and the health
/// service for the management listener.
#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
}

/// Wires adapters into services. Any adapter not supplied falls back to its
/// in-process implementation.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    users: Option<Arc<dyn UserRepository>>,
    messages: Option<Arc<dyn MessageRepository>>,
    storage: Option<Arc<dyn ObjectStorage>>,
    mailer: Option<Arc<dyn Mailer>>,
    identity: Option<Arc<dyn IdentityVerifier>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, users: None, messages: None, storage: None, mailer: None, identity: None }
    }

    #[must_use]
    pub fn with_user_repository(mut self, users: Arc<dyn UserRepository>) -> Self {
        self.users = Some(users);
        self
    }

    #[must_use]
    pub fn with_message_repository(mut self, messages: Arc<dyn MessageRepository>) -> Self {
        self.messages = Some(messages);
        self
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    #[must_use]
    pub fn with_identity_verifier(mut self, identity: Arc<dyn IdentityVerifier>) -> Self {
        self.identity = Some(identity);
        self
    }

    #[must_use]
    pub fn build(self) -> App {
        let config = self.config;

        let (users, messages): (Arc<dyn UserRepository>, Arc<dyn MessageRepository>) = match (self.users, self.messages)
        {
            (Some(users), Some(messages)) => (users, messages),
            (users, messages) => {
                let store = InMemoryStore::new();
                (
                    users.unwrap_or_else(|| Arc::new(store.clone())),
                    messages.unwrap_or_else(|| Arc::new(store)),
                )
            }
        };
        let storage = self.storage.unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let mailer = self.mailer.unwrap_or_else(|| Arc::new(LogMailer));
        let identity = self.identity.unwrap_or_else(|| Arc::new(DisabledIdentityVerifier));

        let auth_service = AuthService::new(config.auth.clone());
        let media_service = MediaService::new(Arc::clone(&storage), &config.storage);

        let registry = ConnectionRegistry::new(Arc::clone(&users));
        let gateway_service = GatewayService::new(registry, config.websocket.clone());

        let message_service = MessageService::new(
            Arc::clone(&messages),
            Arc::clone(&users),
            media_service.clone(),
            gateway_service.clone(),
        );
        let user_service = UserService::new(Arc::clone(&users), Arc::clone(&messages));
        let account_service = AccountService::new(
            Arc::clone(&users),
            messages,
            auth_service.clone(),
            media_service,
            mailer,
            identity,
            &config.auth,
            &config.mail,
        );

        let health_service = HealthService::new(users, storage, config.health.clone());
        let rate_limit_service = RateLimitService::new(config.server.trusted_proxies.clone());

        App {
            services: ServiceContainer {
                account_service,
                auth_service,
                user_service,
                message_service,
                gateway_service,
                rate_limit_service,
            },
            health_service,
        }
    }
}

/// Applies pending database migrations.
///
/// # Errors
/// Returns an error if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Flips `shutdown_tx` to `true` on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {}
            () = terminate => {}
        }

        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through `tracing` so they reach the configured log sinks.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());

        tracing::error!(panic.location = %location, panic.payload = %payload, "Thread panicked");
    }));
}
