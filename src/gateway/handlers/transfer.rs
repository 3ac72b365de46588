//! Transfer and stress-test handlers

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};

use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, StressTestParams, TransferApiRequest, ok};
use super::parse_strategy;
use crate::transfer::stress::{self, StressPlan, StressReport};
use crate::transfer::{TransferRequest, TransferResult};

/// Upper bound on concurrent transfers per stress run
pub const MAX_STRESS_REQUESTS: usize = 10_000;

/// Execute one transfer with the chosen strategy
///
/// POST /api/v1/{strategy}/transfer
///
/// Business failures (insufficient funds, retries exhausted, lock not
/// acquired) come back as `200` with `data.success = false`.
#[utoipa::path(
    post,
    path = "/api/v1/{strategy}/transfer",
    params(("strategy" = String, Path, description = "pessimistic | optimistic | distributed")),
    request_body(content = TransferApiRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Transfer result, successful or not", content_type = "application/json"),
        (status = 400, description = "Unknown strategy or invalid request")
    ),
    tag = "Transfer"
)]
pub async fn transfer(
    State(state): State<Arc<AppState>>,
    Path(strategy): Path<String>,
    Json(body): Json<TransferApiRequest>,
) -> ApiResult<TransferResult> {
    let kind = parse_strategy(&strategy)?;
    let [first, second] = state.coordinator.accounts();

    let request = TransferRequest::new(
        body.from_account.unwrap_or_else(|| first.to_string()),
        body.to_account.unwrap_or_else(|| second.to_string()),
        body.amount.unwrap_or(state.stress.amount),
    )?;

    ok(state.coordinator.transfer(kind, &request).await)
}

/// Fire concurrent transfers and verify the final balances
///
/// POST /api/v1/{strategy}/stress-test
///
/// Resets both accounts first.
#[utoipa::path(
    post,
    path = "/api/v1/{strategy}/stress-test",
    params(
        ("strategy" = String, Path, description = "pessimistic | optimistic | distributed"),
        StressTestParams
    ),
    responses(
        (status = 200, description = "Stress report", content_type = "application/json"),
        (status = 400, description = "Unknown strategy or invalid parameters"),
        (status = 500, description = "Ledger unavailable")
    ),
    tag = "Transfer"
)]
pub async fn stress_test(
    State(state): State<Arc<AppState>>,
    Path(strategy): Path<String>,
    Query(params): Query<StressTestParams>,
) -> ApiResult<StressReport> {
    let kind = parse_strategy(&strategy)?;

    let mut plan = StressPlan::from_config(&state.stress, state.coordinator.accounts());
    if let Some(requests) = params.requests {
        plan.requests = requests;
    }
    if let Some(amount) = params.amount {
        plan.amount = amount;
    }
    if plan.requests == 0 || plan.requests > MAX_STRESS_REQUESTS {
        return ApiError::bad_request(format!(
            "requests must be between 1 and {}",
            MAX_STRESS_REQUESTS
        ))
        .into_err();
    }

    let report = stress::run(state.coordinator.clone(), kind, &plan).await?;
    ok(report)
}
