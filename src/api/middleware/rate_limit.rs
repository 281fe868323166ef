//! Global request rate limiting.

use axum::{extract::Request, middleware::Next, response::Response};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

use super::error::ApiError;

/// Shared rate limiter type.
pub type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Requests per minute used when the configured quota is zero.
pub const FALLBACK_RPM: NonZeroU32 = match NonZeroU32::new(60) {
    Some(rpm) => rpm,
    None => NonZeroU32::MIN,
};

/// Create a rate limiter allowing `requests_per_minute` across all clients.
#[must_use]
pub fn create_rate_limiter(requests_per_minute: u32) -> SharedRateLimiter {
    let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(FALLBACK_RPM);
    Arc::new(RateLimiter::direct(Quota::per_minute(rpm)))
}

/// Reject the request with 429 once the quota is spent.
///
/// # Errors
///
/// Returns [`ApiError::RateLimitExceeded`] when no cell is available.
pub async fn rate_limit(
    limiter: SharedRateLimiter,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match limiter.check() {
        Ok(()) => Ok(next.run(request).await),
        Err(_) => Err(ApiError::RateLimitExceeded),
    }
}
