//! Shared application state for the API server.

use std::sync::Arc;

use crate::db::Repository;
use crate::status::StatusHandle;

/// Shared application state for API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repository for database access.
    pub repository: Arc<Repository>,
    /// Read-only view of the engine's status.
    pub status: StatusHandle,
}

impl AppState {
    /// Create a new `AppState` instance.
    #[must_use]
    pub const fn new(repository: Arc<Repository>, status: StatusHandle) -> Self {
        Self { repository, status }
    }
}
