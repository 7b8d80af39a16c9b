use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use custody_depositd::api::{self, AppState};
use custody_depositd::config::{Config, LogFormat};
use custody_depositd::daemon::{DaemonManager, DaemonRegistry};
use custody_depositd::db::{PgStore, Store};
use custody_depositd::seed::seed_blockchains;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;

    // Initialize structured logging (set RUST_LOG to override the level)
    init_tracing(config.logging.format);

    tracing::info!(
        blockchains = config.blockchains.len(),
        "Deposit daemon starting, configuration loaded from {}",
        config_path
    );

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|e| eyre::eyre!("Failed to connect to database: {}", e))?;

    tracing::info!("Connected to PostgreSQL");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| eyre::eyre!("Failed to run migrations: {}", e))?;

    tracing::info!("Database migrations complete");

    // Seed blockchains and currencies from config
    if !config.blockchains.is_empty() {
        let currencies = seed_blockchains(&pool, &config.blockchains).await?;
        tracing::info!(
            blockchains = config.blockchains.len(),
            currencies,
            "Blockchains seeded"
        );
    }

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let registry = DaemonRegistry::with_builtin();
    tracing::info!(chains = ?registry.chains(), "Daemon implementations registered");

    let manager = Arc::new(DaemonManager::new(
        store.clone(),
        registry,
        config.daemon.monitor_settings(),
    ));
    let poll_interval = config.daemon.poll_interval();

    if config.daemon.autostart {
        let started = manager
            .start_all(poll_interval)
            .await
            .map_err(|e| eyre::eyre!("Failed to start deposit daemons: {}", e))?;
        tracing::info!(count = started.len(), "Deposit daemons running. Press Ctrl+C to stop.");
    } else {
        tracing::info!("Autostart disabled, daemons start on GET /api/daemon");
    }

    // Spawn API server
    if config.api.enabled {
        let state = AppState {
            store,
            manager: manager.clone(),
            poll_interval,
        };
        let host = config.api.host.clone();
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = api::serve(state, &host, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        });
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping all daemons...");
    manager.shutdown().await;

    tracing::info!("Deposit daemon stopped gracefully");
    Ok(())
}
