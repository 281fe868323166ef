//! HTTP handlers for API endpoints.

pub mod headers;
pub mod health;
pub mod transactions;
