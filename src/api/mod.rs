//! HTTP read API over the orphan database.
//!
//! All JSON routes live under `/api/v1`; Swagger UI is served at
//! `/swagger-ui` and anything else falls through to the static files in
//! `public/`.

pub mod docs;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod server;

pub use server::{build_router, run_server};
