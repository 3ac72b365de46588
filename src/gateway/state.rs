use std::sync::Arc;

use crate::config::StressConfig;
use crate::db::Database;
use crate::transfer::TransferCoordinator;

/// Gateway shared state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<TransferCoordinator>,
    /// Defaults for stress runs and for transfer requests without an amount
    pub stress: StressConfig,
    /// PostgreSQL, when the ledger lives there
    pub pg_db: Option<Arc<Database>>,
}

impl AppState {
    pub fn new(coordinator: Arc<TransferCoordinator>, stress: StressConfig) -> Self {
        Self {
            coordinator,
            stress,
            pg_db: None,
        }
    }

    pub fn with_database(mut self, db: Arc<Database>) -> Self {
        self.pg_db = Some(db);
        self
    }
}
