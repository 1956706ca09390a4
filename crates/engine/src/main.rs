//! Kibitz Engine - Main entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kibitz_engine::api;
use kibitz_engine::infrastructure::{
    clock::SystemClock, config::AppConfig, uci::UciEngineFactory,
};
use kibitz_engine::App;

/// Upper bound on waiting for live games to wind down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Spawns a task that cancels the token on SIGTERM/SIGINT
fn setup_shutdown_signal(cancel_token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }

        cancel_token.cancel();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kibitz_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Kibitz Engine");

    let cancel_token = CancellationToken::new();
    setup_shutdown_signal(cancel_token.clone());

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Engine: {} {:?}", config.engine.path, config.engine.args);
    tracing::info!(
        "  Think time: {}ms, variations: {}",
        config.game.think_time.as_millis(),
        config.game.variations
    );

    let engines = Arc::new(UciEngineFactory::new(config.engine.clone()));
    let app = Arc::new(App::new(
        config.game.clone(),
        engines,
        Arc::new(SystemClock::new()),
    ));
    let registry = app.registry.clone();

    let router = api::router(app);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    tracing::info!("Listening on {}", addr);

    let server = axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            tracing::info!("HTTP server received shutdown signal");
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, registry.broadcast_shutdown())
                .await
                .is_err()
            {
                tracing::warn!(
                    remaining = registry.len(),
                    "Timed out waiting for game sessions to close"
                );
            }
        });

    if let Err(e) = server.await {
        tracing::error!("Server error: {}", e);
    }

    tracing::info!("Kibitz Engine shutdown complete");
    Ok(())
}
