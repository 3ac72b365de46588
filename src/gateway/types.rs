//! API Response types and error codes
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `ApiError`: Error response with HTTP status
//! - `error_codes`: Standard error code constants
//! - Request and response DTOs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::ledger::Account;
use crate::transfer::TransferError;

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or absent (error)
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    #[schema(example = 0)]
    pub code: i32,
    /// Response message
    #[schema(example = "ok")]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Error response: HTTP status plus `ApiResponse` body
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    pub fn into_err<T>(self) -> Result<T, ApiError> {
        Err(self)
    }
}

impl From<TransferError> for ApiError {
    fn from(e: TransferError) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = match &e {
            TransferError::InvalidAmount
            | TransferError::SameAccount
            | TransferError::UnknownStrategy(_) => error_codes::INVALID_PARAMETER,
            TransferError::InsufficientFunds { .. } | TransferError::Overflow(_) => {
                error_codes::INSUFFICIENT_BALANCE
            }
            TransferError::AccountNotFound(_) => error_codes::ACCOUNT_NOT_FOUND,
            TransferError::VersionConflict(_)
            | TransferError::ConflictRetriesExhausted { .. }
            | TransferError::LockAcquisitionFailed { .. } => error_codes::CONFLICT,
            TransferError::LockStore(_) => error_codes::SERVICE_UNAVAILABLE,
            TransferError::Storage(_) | TransferError::Internal(_) => error_codes::INTERNAL_ERROR,
        };
        Self::new(status, code, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::error(self.code, self.msg))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Transfer request body. Missing fields fall back to the configured
/// accounts and the stress amount.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TransferApiRequest {
    #[schema(example = "account_a")]
    pub from_account: Option<String>,
    #[schema(example = "account_b")]
    pub to_account: Option<String>,
    #[schema(example = 10000)]
    pub amount: Option<i64>,
}

/// Stress test parameters
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StressTestParams {
    /// Number of concurrent transfers (default from config)
    pub requests: Option<usize>,
    /// Amount per transfer (default from config)
    pub amount: Option<i64>,
}

// ============================================================================
// Response DTOs
// ============================================================================

/// One account row
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceView {
    #[schema(example = "account_a")]
    pub account_id: String,
    #[schema(example = 100000)]
    pub balance: i64,
    #[schema(example = 0)]
    pub version: i64,
}

impl From<Account> for BalanceView {
    fn from(a: Account) -> Self {
        Self {
            account_id: a.id.to_string(),
            balance: a.balance,
            version: a.version,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalancesData {
    pub strategy: String,
    pub balances: Vec<BalanceView>,
    /// Sum of all balances
    #[schema(example = 200000)]
    pub total: i64,
}

impl BalancesData {
    pub fn new(strategy: impl Into<String>, rows: Vec<Account>) -> Self {
        let total = rows.iter().map(|a| a.balance).sum();
        Self {
            strategy: strategy.into(),
            balances: rows.into_iter().map(BalanceView::from).collect(),
            total,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LockInfoData {
    /// Lock store backend
    #[schema(example = "memory")]
    pub backend: String,
    pub locks: Vec<crate::lock_store::LockEntry>,
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
pub mod error_codes {
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_BALANCE: i32 = 1002;

    // Resource errors (4xxx)
    pub const ACCOUNT_NOT_FOUND: i32 = 4004;
    pub const CONFLICT: i32 = 4009;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}
