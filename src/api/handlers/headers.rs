//! Header listing.

use axum::{
    extract::{Query, State},
    Json,
};
use tracing::{debug, instrument};

use crate::api::middleware::error::{raw_query_error, ApiError};
use crate::api::models::{HeaderInfo, HeaderListResponse, HeadersQuery, PaginationInfo, TransactionInfo};
use crate::app_state::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/headers",
    params(HeadersQuery),
    responses(
        (status = 200, description = "Stored headers, newest first", body = HeaderListResponse),
        (status = 400, description = "Raw query rejected", body = crate::api::models::ErrorResponse)
    ),
    tag = "Headers"
)]
/// Lists stored headers, orphans and canonical alike.
///
/// With `raw_sql` the caller's query selects the rows and runs in a
/// rolled-back read-only transaction; the filter parameters are ignored.
#[instrument(skip(state, query), fields(raw = query.raw_sql.is_some()))]
pub async fn list_headers(
    State(state): State<AppState>,
    Query(query): Query<HeadersQuery>,
) -> Result<Json<HeaderListResponse>, ApiError> {
    let filter = query.filter();

    let (records, limit, offset) = match query.raw_sql.as_deref() {
        Some(sql) if !sql.trim().is_empty() => {
            let rows = state.repository.raw_headers(sql).await.map_err(raw_query_error)?;
            (rows, 0, 0)
        }
        _ => {
            let rows = state.repository.list_headers(&filter).await?;
            (rows, filter.limit(), filter.offset.unwrap_or(0).max(0))
        }
    };

    let mut data: Vec<HeaderInfo> = records.into_iter().map(HeaderInfo::from).collect();

    if query.include_txes.unwrap_or(true) {
        let hashes: Vec<String> = data.iter().map(|h| h.hash.clone()).collect();
        let mut txes = state.repository.transactions_for_headers(&hashes).await?;
        for header in &mut data {
            let linked = txes.remove(&header.hash).unwrap_or_default();
            header.txes = Some(linked.into_iter().map(TransactionInfo::from).collect());
        }
    }

    debug!(count = data.len(), "Headers listed");

    let count = data.len();
    Ok(Json(HeaderListResponse {
        data,
        pagination: PaginationInfo {
            limit,
            offset,
            count,
        },
    }))
}
