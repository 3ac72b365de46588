//! Account and lock inspection handlers

use std::sync::Arc;

use axum::extract::{Path, State};

use super::super::state::AppState;
use super::super::types::{ApiResult, BalancesData, LockInfoData, ok};
use super::parse_strategy;
use crate::transfer::StrategyInfo;

/// Reset both accounts to the initial balance
///
/// POST /api/v1/{strategy}/initialize
#[utoipa::path(
    post,
    path = "/api/v1/{strategy}/initialize",
    params(("strategy" = String, Path, description = "pessimistic | optimistic | distributed")),
    responses(
        (status = 200, description = "Accounts reset", body = BalancesData, content_type = "application/json"),
        (status = 400, description = "Unknown strategy")
    ),
    tag = "Account"
)]
pub async fn initialize(
    State(state): State<Arc<AppState>>,
    Path(strategy): Path<String>,
) -> ApiResult<BalancesData> {
    let kind = parse_strategy(&strategy)?;
    let rows = state.coordinator.initialize().await?;
    ok(BalancesData::new(kind.as_str(), rows))
}

/// Current balances and versions
///
/// GET /api/v1/{strategy}/balances
#[utoipa::path(
    get,
    path = "/api/v1/{strategy}/balances",
    params(("strategy" = String, Path, description = "pessimistic | optimistic | distributed")),
    responses(
        (status = 200, description = "Account rows", body = BalancesData, content_type = "application/json"),
        (status = 400, description = "Unknown strategy")
    ),
    tag = "Account"
)]
pub async fn balances(
    State(state): State<Arc<AppState>>,
    Path(strategy): Path<String>,
) -> ApiResult<BalancesData> {
    let kind = parse_strategy(&strategy)?;
    let rows = state.coordinator.balances().await?;
    ok(BalancesData::new(kind.as_str(), rows))
}

/// Describe a strategy
///
/// GET /api/v1/{strategy}/info
#[utoipa::path(
    get,
    path = "/api/v1/{strategy}/info",
    params(("strategy" = String, Path, description = "pessimistic | optimistic | distributed")),
    responses(
        (status = 200, description = "Strategy description", content_type = "application/json"),
        (status = 400, description = "Unknown strategy")
    ),
    tag = "Transfer"
)]
pub async fn info(
    State(state): State<Arc<AppState>>,
    Path(strategy): Path<String>,
) -> ApiResult<StrategyInfo> {
    let kind = parse_strategy(&strategy)?;
    ok(state.coordinator.strategy_info(kind))
}

/// Transfer locks currently held
///
/// GET /api/v1/distributed/lock-info
#[utoipa::path(
    get,
    path = "/api/v1/distributed/lock-info",
    responses(
        (status = 200, description = "Live locks", body = LockInfoData, content_type = "application/json"),
        (status = 503, description = "Lock store unavailable")
    ),
    tag = "Account"
)]
pub async fn lock_info(State(state): State<Arc<AppState>>) -> ApiResult<LockInfoData> {
    let locks = state.coordinator.lock_info().await?;
    ok(LockInfoData {
        backend: state.coordinator.lock_backend().to_string(),
        locks,
    })
}
