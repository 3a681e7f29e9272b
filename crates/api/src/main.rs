use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use framecast_api::config::ServerConfig;
use framecast_api::router::build_app_router;
use framecast_api::{background, state};
use framecast_core::capture::TimesnapEngine;
use framecast_core::encode::FfmpegGifEncoder;
use framecast_core::pipeline::RenderPipeline;
use framecast_events::{JobTracker, SubscriberRegistry};

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "framecast_api=debug,framecast_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        work_root = %config.work_root.display(),
        "Loaded server configuration"
    );

    // --- Render pipeline ---
    let capture = Arc::new(TimesnapEngine::new(
        config.capture_bin.clone(),
        config.stage_timeout,
    ));
    let encoder = Arc::new(FfmpegGifEncoder::new(
        config.ffmpeg_bin.clone(),
        config.stage_timeout,
    ));
    let pipeline = Arc::new(RenderPipeline::new(
        capture,
        encoder,
        config.work_root.clone(),
        config.preserve_failed_workspaces,
    ));
    if config.preserve_failed_workspaces {
        tracing::warn!("Failed workspaces will be kept on disk");
    }

    // --- Progress subscribers ---
    let registry = Arc::new(SubscriberRegistry::new());
    let tracker = Arc::new(JobTracker::new());

    // --- Workspace sweeper ---
    let sweeper_cancel = CancellationToken::new();
    let sweeper_handle = tokio::spawn(background::workspace_sweeper::run(
        config.work_root.clone(),
        Arc::clone(&tracker),
        Duration::from_secs(config.workspace_ttl_secs),
        Duration::from_secs(config.sweep_interval_secs),
        sweeper_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        pipeline,
        registry: Arc::clone(&registry),
        tracker,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let shutdown_registry = Arc::clone(&registry);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open event streams would otherwise hold the server open.
            shutdown_registry.close_all();
        })
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    sweeper_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await;
    tracing::info!("Workspace sweeper stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
