//! Gateway HTTP handlers
//!
//! - `transfer`: single transfers and stress runs
//! - `account`: initialize, balances, strategy info, lock listing
//! - `health`: liveness and backend report

pub mod account;
pub mod health;
pub mod transfer;

pub use account::{balances, info, initialize, lock_info};
pub use health::{HealthResponse, health_check};
pub use transfer::{stress_test, transfer};

use super::types::ApiError;
use crate::transfer::StrategyKind;

/// Path segment to strategy; unknown names are a 400.
pub(crate) fn parse_strategy(raw: &str) -> Result<StrategyKind, ApiError> {
    raw.parse::<StrategyKind>().map_err(ApiError::from)
}
