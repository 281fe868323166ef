//! CLI entry point for the orphan tracker.
//!
//! ```text
//! main.rs (runtime + tracing)
//!     ↓
//! cli::run
//!     ├── Supervisor   (newHeads / newSideHeads subscriptions)
//!     ├── Reconciler   (classify, fetch, upsert)
//!     └── API server   (/api/v1, Swagger UI, static files)
//! ```

use eyre::eyre;
use orphan_tracker::{cli, observability};
use tracing::error;

/// Entry point for the orphan tracker.
///
/// Logging is controlled by `RUST_LOG`, `LOG_JSON` and `LOG_FILE`. A fatal
/// error is reported with its full cause chain.
#[tokio::main]
async fn main() -> eyre::Result<()> {
    let log_level = std::env::var("RUST_LOG").ok();
    let log_file = std::env::var("LOG_FILE").ok().map(std::path::PathBuf::from);
    let json_output = std::env::var("LOG_JSON")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    // Dropping the guard stops the file writer
    let _guard = observability::init_tracing(log_level, log_file, json_output)
        .map_err(|e| eyre!("Failed to initialize tracing: {e}"))?;

    if let Err(e) = cli::run().await {
        error!(error = %e, "Application error");
        return Err(eyre::Report::new(e).wrap_err("orphan-tracker stopped"));
    }

    Ok(())
}
