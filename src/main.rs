use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod models;
mod services;

use services::{
    local_store::LocalObjectStore,
    scheduler::{ScanScheduler, ScanSettings},
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    let result = run().await;
    if let Err(err) = &result {
        error!(error = %format!("{err:#}"), "files-uploader terminated unexpectedly");
    }
    result
}

async fn run() -> Result<()> {
    // --- Parse config + migrate flag ---
    let (cfg, migrate) =
        config::AppConfig::from_env_and_args().context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "files-uploader starting with config: {:?}", cfg
    );
    for setting in &cfg.defaulted {
        warn!(setting = *setting, "Setting not provided, using built-in default");
    }

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)
            .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
        info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    // Create parent directory and the database file if needed
    let db_path_obj = Path::new(db_path);
    if let Some(parent) = db_path_obj.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
            info!("Created missing directory {:?}", parent);
        }
    }
    if !db_url.contains(":memory:") {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path)
            .with_context(|| format!("opening database file {}", db_path))?;
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .with_context(|| format!("connecting to {}", db_url))?,
    );

    let store = LocalObjectStore::new(db, cfg.storage_dir.clone());
    store.migrate().await.context("applying schema")?;

    // --- Handle migration mode ---
    if migrate {
        info!("Database migration complete.");
        return Ok(());
    }

    // --- Shutdown wiring ---
    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    // --- Run the scan loop ---
    let scheduler = ScanScheduler::new(Arc::new(store), ScanSettings::from(&cfg));
    scheduler.run(shutdown).await;

    info!(state = ?scheduler.state(), "files-uploader shut down gracefully");
    Ok(())
}

/// Waits for SIGTERM or SIGINT and cancels `token`.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }

    token.cancel();
}
