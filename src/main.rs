//! RPS match server
//!
//! Entry point for the game server. It runs:
//! - the TCP line-protocol listener players connect to
//! - an HTTP health endpoint

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rps_game_server::app::AppState;
use rps_game_server::config::Config;
use rps_game_server::http::build_router;
use rps_game_server::net;
use rps_game_server::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting RPS match server");
    info!(
        round_deadline_secs = config.round_deadline.as_secs(),
        "Round deadline configured"
    );

    // Create application state
    let state = AppState::new(config.clone());

    let game_listener = TcpListener::bind(config.game_addr).await?;
    let http_listener = TcpListener::bind(config.http_addr).await?;

    info!("Game server listening on {}", config.game_addr);
    info!("Health check: http://{}/health", config.http_addr);

    // One signal stops both listeners
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let game = tokio::spawn(net::serve(
        game_listener,
        state.clone(),
        wait_for_shutdown(shutdown_rx.clone()),
    ));

    axum::serve(http_listener, build_router(state))
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await?;

    game.await??;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
