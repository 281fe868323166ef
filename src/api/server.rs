//! Axum server setup and routing.

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{docs::ApiDoc, handlers, middleware as api_middleware};
use crate::app_state::AppState;
use crate::error::{TrackerError, TrackerResult};

/// Directory served for any path the API does not handle.
pub const STATIC_DIR: &str = "public";

/// Build the application router with the full middleware stack.
pub fn build_router(state: AppState, rate_limit_rpm: u32, cors_origins: &[String]) -> Router {
    let limiter = api_middleware::rate_limit::create_rate_limiter(rate_limit_rpm);

    let api_routes = Router::new()
        .route("/ping", get(handlers::health::ping))
        .route("/status", get(handlers::health::get_status))
        .route("/health", get(handlers::health::health_check))
        .route("/headers", get(handlers::headers::list_headers))
        .route("/transactions", get(handlers::transactions::list_transactions));

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(cors_origins))
        .layer(middleware::from_fn(api_middleware::logging::log_requests))
        .layer(middleware::from_fn(move |req, next| {
            api_middleware::rate_limit::rate_limit(limiter.clone(), req, next)
        }));

    let static_files = ServeDir::new(STATIC_DIR)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(format!("{STATIC_DIR}/index.html")));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api/v1", api_routes)
        .fallback_service(static_files)
        .layer(middleware_stack)
        .with_state(state)
}

/// Serve the API until `shutdown` flips to `true`, then drain in-flight
/// requests.
///
/// # Errors
///
/// Returns a configuration error if the address cannot be bound, and a state
/// error if the server fails while running.
pub async fn run_server(
    state: AppState,
    addr: SocketAddr,
    rate_limit_rpm: u32,
    cors_origins: &[String],
    mut shutdown: watch::Receiver<bool>,
) -> TrackerResult<()> {
    let app = build_router(state, rate_limit_rpm, cors_origins);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        TrackerError::config(format!("Failed to bind HTTP listener on {addr}"), Some(Box::new(e)))
    })?;

    info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if shutdown.wait_for(|stop| *stop).await.is_err() {
                warn!("Shutdown channel dropped, stopping API server");
            }
        })
        .await
        .map_err(|e| TrackerError::state("API server failed", Some(Box::new(e))))?;

    info!("API server stopped");
    Ok(())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        layer.allow_origin(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, models::HeaderRecord, Repository};
    use crate::status::StatusCache;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn test_app(rpm: u32) -> (TempDir, StatusCache, Router) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("api.db").display());
        let repository = Arc::new(Repository::new(create_pool(&url).await.unwrap()));
        let status = StatusCache::new(1, None);
        let app = build_router(AppState::new(repository, status.handle()), rpm, &[]);
        (dir, status, app)
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into()));
        (status, body)
    }

    #[tokio::test]
    async fn test_ping() {
        let (_dir, _status, app) = test_app(600).await;
        let (code, body) = get(&app, "/api/v1/ping").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, "pong");
    }

    #[tokio::test]
    async fn test_status_reflects_cache() {
        let (_dir, status, app) = test_app(600).await;

        let (_, body) = get(&app, "/api/v1/status").await;
        assert_eq!(body["chain_id"], 1);
        assert!(body["latest_header"].is_null());

        status.set_latest(HeaderRecord {
            hash: "0xaa".to_string(),
            number: 42,
            ..Default::default()
        });

        let (_, body) = get(&app, "/api/v1/status").await;
        assert_eq!(body["latest_header"]["number"], 42);
        assert_eq!(body["latest_header"]["orphan"], false);
    }

    #[tokio::test]
    async fn test_empty_header_list() {
        let (_dir, _status, app) = test_app(600).await;
        let (code, body) = get(&app, "/api/v1/headers?orphan=true&limit=5000").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 0);
        assert_eq!(body["pagination"]["limit"], 1000);
    }

    #[tokio::test]
    async fn test_raw_sql_cannot_write() {
        let (_dir, _status, app) = test_app(600).await;
        let (code, body) = get(
            &app,
            "/api/v1/headers?raw_sql=DELETE%20FROM%20headers%20RETURNING%20*",
        )
        .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn test_health_degraded_without_head() {
        let (_dir, _status, app) = test_app(600).await;
        let (code, body) = get(&app, "/api/v1/health").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["database_status"], "healthy");
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let (_dir, _status, app) = test_app(1).await;
        let (first, _) = get(&app, "/api/v1/ping").await;
        let (second, body) = get(&app, "/api/v1/ping").await;
        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "rate_limit_exceeded");
    }
}
