//! Taskboard dashboard server -- realtime Kanban mirror.
//!
//! An axum HTTP/WebSocket server that mirrors coding-assistant task lists:
//! webhook syncs and file edits come in, full snapshots fan out to every
//! connected viewer.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:3050
//! cargo run --bin taskboard-server
//!
//! # Run on custom address with a custom data directory
//! cargo run --bin taskboard-server -- --bind 127.0.0.1:8080 --data-dir ./boards
//!
//! # Or via environment variables
//! TASKBOARD_ADDR=127.0.0.1:8080 cargo run --bin taskboard-server
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use taskboard_server::config::{ServerCliArgs, ServerConfig};
use taskboard_server::docs::DocumentStore;
use taskboard_server::engine::SyncEngine;
use taskboard_server::hub::{self, SubscriberHub};
use taskboard_server::projects::ProjectRegistry;
use taskboard_server::server::{self, AppState};
use taskboard_server::store::TaskStore;
use taskboard_server::watch::DocumentWatcher;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, data_dir = %config.data_dir.display(), "starting taskboard server");

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tokio::fs::create_dir_all(&config.data_dir).await?;

    let projects = Arc::new(ProjectRegistry::load(config.data_dir.join("projects.json")).await?);
    let docs = Arc::new(DocumentStore::new(config.data_dir.clone()));
    let store = Arc::new(TaskStore::new());
    let hub = Arc::new(SubscriberHub::new());
    let engine = Arc::new(SyncEngine::new(
        store,
        Arc::clone(&projects),
        Arc::clone(&docs),
        Arc::clone(&hub),
    ));

    engine.load_from_disk().await;

    let _watcher = DocumentWatcher::spawn(
        Arc::clone(&engine),
        Arc::clone(&docs),
        Arc::clone(&projects),
    )?;
    let _reaper = hub::spawn_reaper(
        hub,
        Duration::from_secs(config.heartbeat_sweep_secs),
        Duration::from_secs(config.heartbeat_window_secs),
    );

    let state = AppState {
        engine,
        projects,
        docs,
        public_base_url: config.public_base_url.clone(),
        list_limit: config.list_limit,
    };

    let (bound_addr, handle) = server::start_server(&config.bind_addr, state).await?;
    tracing::info!(addr = %bound_addr, "taskboard server listening");
    handle.await?;
    Ok(())
}
