//! ledger_locks gateway
//!
//! ```text
//! ┌──────────┐    ┌─────────────┐    ┌──────────────────────┐
//! │  Config  │───▶│ Coordinator │───▶│ Ledger  (PG | memory)│
//! │  (YAML)  │    │ 3 strategies│───▶│ Locks   (PG | memory)│
//! └──────────┘    └─────────────┘    └──────────────────────┘
//!                        ▲
//!                   HTTP gateway
//! ```
//!
//! Usage: `ledger_locks [--env dev] [--port 8000] [--memory]`

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use ledger_locks::config::AppConfig;
use ledger_locks::db::Database;
use ledger_locks::gateway::{self, AppState};
use ledger_locks::ledger::{LedgerStore, MemoryLedger, PgLedger};
use ledger_locks::lock_store::{LockStore, MemoryLockStore, PgLockStore};
use ledger_locks::logging::init_logging;
use ledger_locks::transfer::TransferCoordinator;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

fn force_memory() -> bool {
    std::env::args().any(|a| a == "--memory")
}

/// PostgreSQL URL from `DATABASE_URL`, else from config
fn database_url(config: &AppConfig) -> Option<String> {
    std::env::var("DATABASE_URL")
        .ok()
        .filter(|url| !url.is_empty())
        .or_else(|| config.postgres_url.clone())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _log_guard = init_logging(&config);

    info!(env = %env, "Starting ledger_locks");

    let url = if force_memory() {
        None
    } else {
        database_url(&config)
    };

    let (ledger, locks, pg_db): (Arc<dyn LedgerStore>, Arc<dyn LockStore>, Option<Arc<Database>>) =
        match url {
            Some(url) => {
                let db = Arc::new(
                    Database::connect(&url)
                        .await
                        .context("Failed to connect to PostgreSQL")?,
                );
                db.init_schema().await.context("Failed to create schema")?;
                let ledger = PgLedger::new(db.pool().clone())
                    .with_lock_timeout(config.ledger.lock_timeout());
                let locks = PgLockStore::new(db.pool().clone());
                (Arc::new(ledger), Arc::new(locks), Some(db))
            }
            None => {
                warn!("No PostgreSQL configured, using in-memory ledger and lock store");
                let ledger = MemoryLedger::new().with_lock_timeout(config.ledger.lock_timeout());
                (Arc::new(ledger), Arc::new(MemoryLockStore::new()), None)
            }
        };

    let coordinator = Arc::new(TransferCoordinator::from_config(ledger, locks, &config));
    let accounts = coordinator
        .initialize()
        .await
        .context("Failed to initialize accounts")?;
    info!(?accounts, "Ledger ready");

    let mut state = AppState::new(coordinator, config.stress.clone());
    if let Some(db) = pg_db {
        state = state.with_database(db);
    }

    let port = get_port_override().unwrap_or(config.gateway.port);
    gateway::run_server(Arc::new(state), &config.gateway.host, port).await?;

    info!("Gateway stopped");
    Ok(())
}
