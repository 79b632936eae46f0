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

use parley_server::adapters::database::{PgMessageRepository, PgUserRepository};
use parley_server::adapters::identity::{GoogleIdentityVerifier, IdentityVerifier};
use parley_server::adapters::mail::{LogMailer, Mailer, SmtpMailer};
use parley_server::adapters::storage::{S3Storage, s3};
use parley_server::api::MgmtState;
use parley_server::config::Config;
use parley_server::{AppBuilder, adapters, telemetry};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    parley_server::setup_panic_hook();

    let boot_span = tracing::info_span!("boot_server");
    let (api_listener, mgmt_listener, app_router, mgmt_app, shutdown_tx, shutdown_rx) = async {
        // Phase 1: Infrastructure Setup (Resources)
        let pool = adapters::database::init_pool(&config.database).await?;
        parley_server::run_migrations(&pool).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        parley_server::spawn_signal_handler(shutdown_tx.clone());

        let s3_client = s3::initialize_client(&config.storage).await;

        let mailer: Arc<dyn Mailer> = match &config.mail.smtp_host {
            Some(host) => Arc::new(SmtpMailer::new(host, &config.mail)?),
            None => {
                tracing::warn!("No SMTP host configured, outgoing email will only be logged");
                Arc::new(LogMailer)
            }
        };

        let mut builder = AppBuilder::new(config.clone())
            .with_user_repository(Arc::new(PgUserRepository::new(pool.clone())))
            .with_message_repository(Arc::new(PgMessageRepository::new(pool)))
            .with_storage(Arc::new(S3Storage::new(s3_client, config.storage.bucket.clone())))
            .with_mailer(mailer);

        if let Some(client_id) = &config.auth.google_client_id {
            let verifier: Arc<dyn IdentityVerifier> = Arc::new(GoogleIdentityVerifier::new(client_id.clone())?);
            builder = builder.with_identity_verifier(verifier);
        }

        // Phase 2: Component Wiring (Pure logic, no side effects)
        let app = builder.build();

        // Phase 3: Runtime Setup (Listeners and Routers)
        let app_router = parley_server::api::app_router(config.clone(), app.services, shutdown_rx.clone())?;
        let mgmt_app = parley_server::api::mgmt_router(MgmtState { health_service: app.health_service });

        let api_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        let mgmt_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.mgmt_port).parse()?;

        tracing::info!(address = %api_addr, "listening");
        tracing::info!(address = %mgmt_addr, "management server listening");

        let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
        let mgmt_listener = tokio::net::TcpListener::bind(mgmt_addr).await?;

        Ok::<
            (
                tokio::net::TcpListener,
                tokio::net::TcpListener,
                axum::Router,
                axum::Router,
                watch::Sender<bool>,
                watch::Receiver<bool>,
            ),
            anyhow::Error,
        >((api_listener, mgmt_listener, app_router, mgmt_app, shutdown_tx, shutdown_rx))
    }
    .instrument(boot_span)
    .await?;

    // Phase 4: Start Runtime
    let mut api_rx = shutdown_rx.clone();
    let api_server = axum::serve(api_listener, app_router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = api_rx.wait_for(|&s| s).await;
        });

    let mut mgmt_rx = shutdown_rx.clone();
    let mgmt_server = axum::serve(mgmt_listener, mgmt_app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = mgmt_rx.wait_for(|&s| s).await;
        });

    let servers = async { tokio::try_join!(api_server.into_future(), mgmt_server.into_future()) };
    let mut timeout_rx = shutdown_rx.clone();
    let shutdown_timeout = std::time::Duration::from_secs(config.server.shutdown_timeout_secs);

    // Phase 5: Graceful Shutdown Orchestration. Open sessions close with 1001
    // once the signal flips; the drain is bounded by the shutdown timeout.
    tokio::select! {
        result = servers => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Server error");
            }
        }
        () = async {
            let _ = timeout_rx.wait_for(|&s| s).await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            tracing::warn!("Timeout waiting for connections to drain");
        }
    }

    let _ = shutdown_tx.send(true);
    telemetry_guard.shutdown();
    Ok(())
}
