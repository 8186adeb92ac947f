use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, post},
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod config;
mod error;
mod handlers;
mod hub;
mod metrics;
mod ws;

#[cfg(test)]
mod server_tests;
#[cfg(test)]
mod test_helpers;

use crate::config::{FileConfig, ServerConfig, SessionConfig, load_config};
use crate::hub::HubHandle;
use crate::metrics::ServerMetrics;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "codepair")]
#[command(about = "Real-time collaborative code session server")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "codepair.toml")]
    config: PathBuf,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the web server (overrides config, 0 = auto-select)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub hub: HubHandle,
    /// Server metrics for observability
    pub metrics: Arc<ServerMetrics>,
    pub session_config: Arc<SessionConfig>,
    /// Cancelled on shutdown so open sockets close promptly
    pub shutdown: CancellationToken,
}

/// Assemble the HTTP and WebSocket routes.
pub(crate) fn build_router(state: AppState, cors_permissive: bool) -> Router {
    let app = Router::new()
        .route("/api/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/sessions", post(handlers::create_session))
        .route("/api/sessions/{id}", get(handlers::get_session))
        .route("/api/ws", get(handlers::session_websocket_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan));

    let app = if cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };

    app.with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "codepair=debug,tower_http=debug,info"
    } else {
        "codepair=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let file_config: FileConfig = load_config(&cli.config)
        .extract()
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    let server_config =
        ServerConfig::from_file(&file_config.server).with_overrides(cli.host, cli.port);
    let session_config = SessionConfig::from_file(&file_config.session);

    info!("Starting codepair session server");
    info!(
        "Empty sessions are kept for {}s before cleanup",
        session_config.hub.grace_period.as_secs()
    );

    let metrics = Arc::new(ServerMetrics::new());
    let hub = hub::spawn_hub(
        session_config.hub.clone(),
        session_config.command_capacity,
        metrics.clone(),
    );
    let shutdown = CancellationToken::new();

    let app_state = AppState {
        hub: hub.clone(),
        metrics,
        session_config: Arc::new(session_config),
        shutdown: shutdown.clone(),
    };
    let app = build_router(app_state, server_config.cors_permissive);

    let addr = server_config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("codepair listening on http://{}", actual_addr);
    info!("API endpoints:");
    info!("  POST   /api/sessions       - Create a session");
    info!("  GET    /api/sessions/:id   - Get session state");
    info!("  GET    /api/ws             - Session WebSocket");
    info!("  GET    /api/health         - Health summary");

    // Create shutdown signal handler
    let signal_token = shutdown.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Received shutdown signal, cleaning up...");
        signal_token.cancel();
    };

    // Run server with graceful shutdown
    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    // Sockets are closed by now; drop the in-memory store with the actor
    shutdown.cancel();
    if let Err(e) = hub.shutdown().await {
        warn!("Session hub did not stop cleanly: {}", e);
    }

    info!("Shutdown complete");
    server_result
}
