//! IMDb Server - Main entry point

use anyhow::Result;
use imdb_common::logging::{init_logging, LogConfig};
use imdb_ingest::store::{PgStore, TitleLookup};
use imdb_ingest::SyncOrchestrator;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tracing::info;

use imdb_server::{api, config::Config, AppState, Readiness, SyncScheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment
    let log_config = LogConfig::builder()
        .log_file_prefix("imdb-server")
        .filter_directives("imdb_server=debug,imdb_ingest=info,tower_http=debug,sqlx=warn")
        .build();

    // Environment variables take precedence
    let log_config = LogConfig::from_env_or(log_config.clone()).unwrap_or(log_config);

    init_logging(&log_config)?;

    info!("Starting IMDb Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_secs))
        .connect(&config.database.url)
        .await?;

    info!("Database connection pool established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    let store = Arc::new(PgStore::new(db_pool));
    let client = reqwest::Client::builder()
        .user_agent(concat!("imdb-server/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let orchestrator = Arc::new(SyncOrchestrator::for_store(
        &config.sync,
        client,
        Arc::clone(&store),
    )?);

    let readiness = Readiness::new();
    let scheduler = SyncScheduler::new(
        Arc::clone(&orchestrator),
        config.schedule.interval(),
        readiness.clone(),
    );

    let _scheduler_handle = if config.schedule.enabled {
        info!(
            datasets = ?config.sync.datasets,
            "Sync is enabled, starting scheduler"
        );
        Some(scheduler.start())
    } else {
        info!("Sync is disabled (IMDB_SYNC_ENABLED=false)");
        scheduler.prepare().await?;
        None
    };

    let titles: Arc<dyn TitleLookup> = store;
    let state = AppState {
        titles,
        sync: orchestrator,
        readiness,
    };

    let app = api::router(state, &config.cors).layer(CompressionLayer::new());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
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

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
