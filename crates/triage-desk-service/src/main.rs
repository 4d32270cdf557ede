// crates/triage-desk-service/src/main.rs
// ============================================================================
// Module: Triage Desk Binary
// Description: Process wiring for the headless coordinator.
// Purpose: Load configuration, open the store, run the scheduler until
//          SIGINT.
// Dependencies: tokio, tracing, tracing-subscriber, triage-desk-config,
//               triage-desk-core, triage-desk-service, triage-desk-store-sqlite
// ============================================================================

//! ## Overview
//! Headless entry point: configuration and store initialization, tracing
//! setup, and the scheduler loop (nudges, auto-closes, notification drain)
//! with graceful SIGINT shutdown. The chat transport is the console adapter;
//! a deployment with a real platform transport wires its adapter and event
//! source around [`triage_desk_service::router::Router`] the same way.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use triage_desk_config::TriageConfig;
use triage_desk_core::SystemClock;
use triage_desk_service::adapter::ConsoleChatAdapter;
use triage_desk_service::scheduler::Scheduler;
use triage_desk_store_sqlite::SqliteStoreConfig;
use triage_desk_store_sqlite::SqliteTriageStore;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Initializes the process and runs the scheduler until SIGINT.
#[tokio::main]
async fn main() -> ExitCode {
    let config = match TriageConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            init_tracing("info");
            tracing::error!(error = %err, "configuration invalid");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log_level);

    let store = match SqliteTriageStore::new(SqliteStoreConfig::for_path(&config.database_path)) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::error!(error = %err, "store initialization failed");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(path = %config.database_path.display(), "store opened");

    let adapter = Arc::new(ConsoleChatAdapter::new());
    let mut scheduler = Scheduler::new(
        Arc::clone(&store),
        Arc::clone(&adapter),
        Arc::clone(&config),
        Arc::new(SystemClock),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(error = %err, "signal listener failed"),
    }
    let _ = shutdown_tx.send(true);
    if let Err(err) = scheduler_task.await {
        tracing::error!(error = %err, "scheduler task join failed");
        return ExitCode::FAILURE;
    }
    tracing::info!("stopped");
    ExitCode::SUCCESS
}

/// Installs the global tracing subscriber.
fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive.to_string()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
