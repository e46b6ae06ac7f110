use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use upscale_api::background::task_retention;
use upscale_api::config::ServerConfig;
use upscale_api::router::build_app_router;
use upscale_api::state::AppState;
use upscale_upscayl::api::UpscaylApi;
use upscale_upscayl::manager::TaskManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid server configuration")?;

    // --- Tracing ---
    let (json_layer, pretty_layer) = if config.json_logs {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "upscale_api=debug,upscale_upscayl=debug,tower_http=debug".into()
            }),
        )
        .with(json_layer)
        .with(pretty_layer)
        .init();

    tracing::info!(
        host = %config.host,
        port = %config.port,
        upstream = %config.upscayl.api_url,
        "Loaded server configuration"
    );
    if !config.request_timeout_covers_sync() {
        tracing::warn!(
            request_timeout_secs = config.request_timeout_secs,
            sync_timeout_secs = config.manager.sync_timeout.as_secs(),
            "REQUEST_TIMEOUT_SECS does not exceed SYNC_TIMEOUT_SECS; sync uploads may be cut off with 408"
        );
    }

    // --- Upscayl client + task manager ---
    let api = UpscaylApi::new(config.upscayl.clone());
    let task_manager = Arc::new(TaskManager::new(Arc::new(api), config.manager.clone()));
    tracing::info!("Task manager ready");

    // --- Task retention ---
    let retention_cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(task_retention::run(
        Arc::clone(task_manager.store()),
        config.retention.clone(),
        retention_cancel.clone(),
    ));

    // --- App state + router ---
    let state = AppState {
        config: Arc::new(config.clone()),
        task_manager,
    };
    let app = build_app_router(state, &config)?;

    // --- Start server ---
    let host = config
        .host
        .parse::<IpAddr>()
        .with_context(|| format!("Invalid HOST address '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Task retention job stopped");

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix). If a handler cannot
/// be installed the error is logged and that signal is ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
