//! Transaction listing.

use axum::{
    extract::{Query, State},
    Json,
};
use tracing::{debug, instrument};

use crate::api::middleware::error::{raw_query_error, ApiError};
use crate::api::models::{
    HeaderInfo, PaginationInfo, TransactionInfo, TransactionListResponse, TransactionsQuery,
};
use crate::app_state::AppState;
use crate::db::models::clamp_limit;

#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    params(TransactionsQuery),
    responses(
        (status = 200, description = "Stored transactions, most recent first", body = TransactionListResponse),
        (status = 400, description = "Raw query rejected", body = crate::api::models::ErrorResponse)
    ),
    tag = "Transactions"
)]
/// Lists stored transactions with the headers that include them.
#[instrument(skip(state, query), fields(raw = query.raw_sql.is_some()))]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionListResponse>, ApiError> {
    let (records, limit, offset) = match query.raw_sql.as_deref() {
        Some(sql) if !sql.trim().is_empty() => {
            let rows = state
                .repository
                .raw_transactions(sql)
                .await
                .map_err(raw_query_error)?;
            (rows, 0, 0)
        }
        _ => {
            let limit = clamp_limit(query.limit);
            let offset = query.offset.unwrap_or(0).max(0);
            let rows = state.repository.list_transactions(limit, offset).await?;
            (rows, limit, offset)
        }
    };

    let mut data: Vec<TransactionInfo> = records.into_iter().map(TransactionInfo::from).collect();

    if query.include_headers.unwrap_or(true) {
        let hashes: Vec<String> = data.iter().map(|t| t.hash.clone()).collect();
        let mut headers = state.repository.headers_for_transactions(&hashes).await?;
        for tx in &mut data {
            let linked = headers.remove(&tx.hash).unwrap_or_default();
            tx.headers = Some(linked.into_iter().map(HeaderInfo::from).collect());
        }
    }

    debug!(count = data.len(), "Transactions listed");

    let count = data.len();
    Ok(Json(TransactionListResponse {
        data,
        pagination: PaginationInfo {
            limit,
            offset,
            count,
        },
    }))
}
