//! Geonames Server - Main entry point

use anyhow::Result;
use geonames_common::config::Settings;
use geonames_common::logging::{init_logging, LogConfig};
use geonames_ingest::db;
use std::{future::IntoFuture, net::SocketAddr, time::Duration};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use geonames_server::{
    api,
    features::{ingest::IngestTrigger, FeatureState},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("geonames-server")
        .filter_directives("geonames_server=debug,geonames_ingest=info,tower_http=debug,sqlx=warn")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;
    init_logging(&log_config)?;

    info!("Starting Geonames Server");

    let settings = Settings::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        settings.server.host, settings.server.port
    );

    let db_pool = db::create_pool(&settings.database).await?;
    db::run_migrations(&db_pool).await?;

    let shutdown = CancellationToken::new();
    let state = FeatureState {
        db: db_pool.clone(),
        trigger: IngestTrigger::new(settings.ingest.clone(), shutdown.clone()),
    };
    let app = api::create_router(state, &settings.server);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    let stopping = shutdown.clone();
    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(async move { stopping.cancelled().await })
        .into_future();
    let mut serve = std::pin::pin!(serve);

    let timeout = Duration::from_secs(settings.server.shutdown_timeout_secs);
    tokio::select! {
        result = &mut serve => result?,
        _ = shutdown_signal(shutdown.clone()) => {
            // Drain in-flight requests, but not forever
            match tokio::time::timeout(timeout, serve).await {
                Ok(result) => result?,
                Err(_) => warn!("Connections still open after {:?}, forcing shutdown", timeout),
            }
        },
    }

    if tokio::time::timeout(timeout, db_pool.close()).await.is_err() {
        warn!("Database pool did not close within {:?}", timeout);
    }

    info!("Server stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Also stops any background ingestion at its next checkpoint
    shutdown.cancel();
}
