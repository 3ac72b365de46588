//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8000/docs`
//! - OpenAPI JSON: `http://localhost:8000/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::gateway::handlers::HealthResponse;
use crate::gateway::types::{BalanceView, BalancesData, LockInfoData, TransferApiRequest};
use crate::lock_store::LockEntry;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Ledger Locks API",
        version = "0.1.0",
        description = "Balance transfers between two accounts under pessimistic, optimistic and distributed locking.",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8000", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health::health_check,
        crate::gateway::handlers::transfer::transfer,
        crate::gateway::handlers::transfer::stress_test,
        crate::gateway::handlers::account::initialize,
        crate::gateway::handlers::account::balances,
        crate::gateway::handlers::account::info,
        crate::gateway::handlers::account::lock_info,
    ),
    components(
        schemas(
            HealthResponse,
            TransferApiRequest,
            BalanceView,
            BalancesData,
            LockInfoData,
            LockEntry,
        )
    ),
    tags(
        (name = "Transfer", description = "Transfers and stress runs per strategy"),
        (name = "Account", description = "Account reset, balances and held locks"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Ledger Locks API");
        assert!(spec.to_json().is_ok());
    }

    #[test]
    fn test_endpoints_registered() {
        let paths = ApiDoc::openapi().paths.paths;
        for path in [
            "/api/v1/health",
            "/api/v1/{strategy}/transfer",
            "/api/v1/{strategy}/stress-test",
            "/api/v1/{strategy}/initialize",
            "/api/v1/{strategy}/balances",
            "/api/v1/{strategy}/info",
            "/api/v1/distributed/lock-info",
        ] {
            assert!(paths.contains_key(path), "missing {}", path);
        }
    }
}
