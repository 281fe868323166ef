//! OpenAPI documentation for the REST API.

use utoipa::OpenApi;

use crate::api::handlers;

/// OpenAPI documentation for the REST API.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::ping,
        handlers::health::get_status,
        handlers::health::health_check,
        handlers::headers::list_headers,
        handlers::transactions::list_transactions,
    ),
    components(schemas(
        crate::api::models::HeaderInfo,
        crate::api::models::TransactionInfo,
        crate::api::models::StatusResponse,
        crate::api::models::HeaderListResponse,
        crate::api::models::TransactionListResponse,
        crate::api::models::PaginationInfo,
        crate::api::models::HealthResponse,
        crate::api::models::HealthStatus,
        crate::api::models::ErrorResponse,
    )),
    tags(
        (name = "Health", description = "Liveness, status and health"),
        (name = "Headers", description = "Canonical, side and uncle headers"),
        (name = "Transactions", description = "Transactions and their including headers"),
    ),
    info(
        title = "Orphan Tracker API",
        version = "1.0.0",
        description = "Read API over recorded orphan, uncle and canonical Ethereum blocks",
    )
)]
pub struct ApiDoc;
