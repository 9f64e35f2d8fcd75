//! Process entry point: wires together configuration, logging, the database,
//! the long-lived session/aggregator services, and the HTTP server, then
//! drives an orderly shutdown on signal.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use transcription_gateway::api::{self, AppState};
use transcription_gateway::config::Settings;
use transcription_gateway::database::{self, SqlxChunkSink};
use transcription_gateway::session::SessionManager;
use transcription_gateway::{aggregator::ChunkAggregatorRegistry, logging};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Arc::new(Settings::from_env()?);

    let _logging_guard = logging::init(&settings.log_dir)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    info!(
        service = %settings.service_name,
        version = %settings.service_version,
        "starting transcription gateway"
    );

    install_rustls_provider();

    let pool = database::init_pool(&settings.database_url).await?;
    database::run_migrations(&pool).await?;

    let chunk_sink = Arc::new(SqlxChunkSink::new(pool));
    let session_manager = Arc::new(SessionManager::new(
        settings.session_cap,
        Duration::from_secs(settings.session_timeout_secs),
    ));
    let aggregators = Arc::new(ChunkAggregatorRegistry::new(
        chunk_sink,
        Duration::from_secs(settings.chunk_duration_secs),
    ));
    let http_client = reqwest::Client::new();

    let watchdog_cancel = CancellationToken::new();
    let watchdog_handle = tokio::spawn(
        session_manager
            .clone()
            .run_stall_watchdog(watchdog_cancel.clone()),
    );

    let state = AppState::new(
        settings.clone(),
        session_manager.clone(),
        aggregators,
        http_client,
    );
    let router = api::build_router(state);

    let server_cancel = CancellationToken::new();
    let server_handle = tokio::spawn(api::serve(
        router,
        settings.bind_address.clone(),
        settings.port,
        server_cancel.clone(),
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, initiating shutdown");
        }
        _ = wait_for_sigterm() => {
            info!("received SIGTERM, initiating shutdown");
        }
    }

    watchdog_cancel.cancel();
    let _ = watchdog_handle.await;

    session_manager.shutdown().await;

    server_cancel.cancel();
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "HTTP server exited with an error"),
        Err(err) => warn!(error = %err, "HTTP server task panicked"),
    }

    info!("transcription gateway shutdown complete");
    Ok(())
}

/// Installs the process-wide rustls crypto provider once, ahead of the first
/// outbound TLS connection (STT WebSocket, HLS availability probe).
fn install_rustls_provider() {
    if let Err(err) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        warn!(?err, "rustls CryptoProvider already installed");
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}
