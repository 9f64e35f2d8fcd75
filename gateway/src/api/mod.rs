//! HTTP boundary: route wiring, DTOs, and the HTTP-facing error type.
//!
//! Keeps axum concerns (routing, extractors, JSON framing) out of the
//! domain/pipeline layers; everything here talks to the rest of the crate
//! through [`SessionManager`], [`ChunkAggregatorRegistry`] and [`Settings`].

pub mod error;
pub mod models;
pub mod routes;
pub mod validation;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::Span;

use crate::aggregator::ChunkAggregatorRegistry;
use crate::config::Settings;
use crate::error::Result;
use crate::session::SessionManager;

/// Shared application state injected into every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub session_manager: Arc<SessionManager>,
    pub aggregators: Arc<ChunkAggregatorRegistry>,
    pub http_client: reqwest::Client,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        session_manager: Arc<SessionManager>,
        aggregators: Arc<ChunkAggregatorRegistry>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            settings,
            session_manager,
            aggregators,
            http_client,
            start_time: Instant::now(),
        }
    }
}

/// Builds the full router: health, admission, session listing, chunk
/// history, and the two real-time subscriber endpoints, all under
/// `/api/v1`, plus CORS and request tracing.
pub fn build_router(state: AppState) -> Router {
    let router = routes::create_router(state);

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    if req.uri().path().ends_with("/health") {
                        Span::none()
                    } else {
                        tower_http::trace::DefaultMakeSpan::new()
                            .level(tracing::Level::INFO)
                            .make_span(req)
                    }
                })
                .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
}

/// Binds and serves `router`, shutting down gracefully when `cancel` fires.
pub async fn serve(router: Router, bind_address: String, port: u16, cancel: CancellationToken) -> Result<()> {
    let addr: SocketAddr = format!("{bind_address}:{port}")
        .parse()
        .map_err(|e| crate::error::Error::config(format!("invalid bind address: {e}")))?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            tracing::info!("HTTP server shutting down");
        })
        .await?;

    Ok(())
}

/// How long a subscriber waits for a segment before emitting a heartbeat.
pub const SUBSCRIBER_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
