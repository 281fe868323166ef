//! Request logging middleware using tracing.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn};

/// Logs each request with its status and latency.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(request).await;

    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        warn!(%method, path, status, duration_ms, "Request failed");
    } else {
        info!(%method, path, status, duration_ms, "Request completed");
    }

    response
}
