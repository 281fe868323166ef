//! Observability and structured logging infrastructure.
//!
//! The tracker runs unattended for long periods, so every reconciliation
//! decision (side head stored, sibling demoted, resubscribe) is logged with
//! structured fields: `hash`, `number`, `kind`, `attempt`.
//!
//! # Usage
//!
//! Initialize tracing at application startup:
//!
//! ```no_run
//! use orphan_tracker::observability;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Pretty console output, info level
//!     let _guard = observability::init_tracing(None, None, false)?;
//!     Ok(())
//! }
//! ```
//!
//! # Environment Configuration
//!
//! ```bash
//! # Component-specific levels
//! RUST_LOG=orphan_tracker=debug,sqlx=warn orphan-tracker track
//!
//! # JSON output for log aggregation
//! LOG_JSON=true orphan-tracker track
//!
//! # Write logs to file with daily rotation
//! LOG_FILE=./logs/tracker.log orphan-tracker track
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Default filter: info for this crate, warn for dependencies.
pub const DEFAULT_FILTER: &str = "orphan_tracker=info,warn";

/// Initialize the tracing subscriber with configurable output formats.
///
/// # Arguments
///
/// * `log_level` - Optional filter override (e.g., "debug"). `RUST_LOG` wins when set.
/// * `log_file` - Optional file path for log output with daily rotation.
/// * `json_output` - JSON console output instead of the pretty format.
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the lifetime of the process.
///
/// # Errors
///
/// Returns an error if:
/// - The log directory cannot be created
/// - A global subscriber was already installed
pub fn init_tracing(
    log_level: Option<String>,
    log_file: Option<PathBuf>,
    json_output: bool,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let env_filter = if let Ok(filter) = std::env::var("RUST_LOG") {
        EnvFilter::new(filter)
    } else if let Some(level) = log_level {
        EnvFilter::new(level)
    } else {
        EnvFilter::new(DEFAULT_FILTER)
    };

    let console_layer = if json_output {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .boxed()
    };

    let mut guard = None;
    let file_layer = if let Some(ref path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file_appender = tracing_appender::rolling::daily(
            path.parent().unwrap_or_else(|| Path::new(".")),
            path.file_name().unwrap_or_else(|| OsStr::new("tracker.log")),
        );
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        // File output is always JSON
        Some(
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_current_span(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    info!(
        json_output,
        file_logging = log_file.is_some(),
        "Tracing initialized"
    );

    Ok(guard)
}

/// Install a test-writer subscriber. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("orphan_tracker=debug"))
        .try_init();
}
