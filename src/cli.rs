//! Command-line interface for the orphan tracker.
//!
//! # Commands
//!
//! - `track`: subscribe to a node, record orphans and serve the API
//! - `serve`: serve the API over an existing database, no node needed
//! - `orphans`: print the most recent orphan headers
//!
//! # Example
//!
//! ```bash
//! orphan-tracker track --rpc.target ws://127.0.0.1:8546 --db.path ./orphans.db
//! orphan-tracker serve --db.path ./orphans.db --http.addr 127.0.0.1:8080
//! orphan-tracker orphans --limit 10
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::api::run_server;
use crate::app_state::AppState;
use crate::chain::ChainClient;
use crate::config::Config;
use crate::db::{create_pool, models::HeaderFilter, models::HeaderRecord, Repository};
use crate::error::{TrackerError, TrackerResult};
use crate::normalize::normalize_header;
use crate::reorg::{Reconciler, ReconcilerSettings};
use crate::rpc::WebSocketProvider;
use crate::status::StatusCache;
use crate::supervisor::{BackoffPolicy, Supervisor};

/// Reorg-aware recorder of orphan, side and uncle blocks
#[derive(Parser, Debug)]
#[command(name = "orphan-tracker")]
#[command(about = "Records orphan, side and uncle Ethereum blocks", long_about = None)]
#[command(version)]
struct Cli {
    /// Node WebSocket URL or IPC path (overrides RPC_TARGET)
    #[arg(long = "rpc.target", global = true)]
    rpc_target: Option<String>,

    /// SQLite database path (overrides DATABASE_URL)
    #[arg(long = "db.path", global = true)]
    db_path: Option<String>,

    /// HTTP listen address (overrides HTTP_ADDR)
    #[arg(long = "http.addr", global = true)]
    http_addr: Option<SocketAddr>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Follow the chain, record orphans and serve the API
    Track,

    /// Serve the API over an existing database
    Serve,

    /// Print recent orphan headers
    Orphans {
        /// Number of headers to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
}

/// Parse CLI arguments and execute the appropriate command.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the database cannot be
/// opened, or a long-running task fails fatally.
pub async fn run() -> TrackerResult<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?.with_overrides(cli.rpc_target, cli.db_path, cli.http_addr)?;

    match cli.command {
        Commands::Track => run_track_command(&config).await,
        Commands::Serve => run_serve_command(&config).await,
        Commands::Orphans { limit } => run_orphans_command(&config, limit).await,
    }
}

async fn open_repository(config: &Config) -> TrackerResult<Arc<Repository>> {
    let pool = create_pool(config.database_url()).await?;
    Ok(Arc::new(Repository::new(pool)))
}

/// Execute the track command.
async fn run_track_command(config: &Config) -> TrackerResult<()> {
    let backoff = BackoffPolicy::with_max_attempts(config.max_reconnect_attempts());
    let client = Arc::new(
        WebSocketProvider::connect_with_retry(config.rpc_target()?.to_string(), backoff).await?,
    );

    let chain_id = client.chain_id().await?;
    let head = client.latest_header().await?;
    info!(chain_id, number = head.number(), hash = %head.hash, "Connected to chain");

    let repository = open_repository(config).await?;

    let mut latest = normalize_header(&head, &[])?;
    latest.orphan = false;

    let settings = ReconcilerSettings {
        trail_depth: config.trail_depth(),
        trail_strict: config.trail_strict(),
    };
    let reconciler = Reconciler::new(
        Arc::clone(&client),
        Arc::clone(&repository),
        StatusCache::new(chain_id, Some(latest)),
        chain_id,
        settings,
    )
    .with_previous_head(&head);

    let state = AppState::new(Arc::clone(&repository), reconciler.status_handle());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events_tx, events_rx) = mpsc::channel(config.event_buffer());
    let supervisor = Supervisor::new(client, events_tx, backoff);

    println!(
        "{} chain {} from block {}",
        "Tracking".cyan().bold(),
        chain_id.to_string().yellow(),
        head.number().to_string().yellow()
    );

    let mut tasks: JoinSet<(&'static str, TrackerResult<()>)> = JoinSet::new();

    let rx = shutdown_rx.clone();
    tasks.spawn(async move { ("supervisor", supervisor.run(rx).await) });

    let rx = shutdown_rx.clone();
    tasks.spawn(async move { ("reconciler", reconciler.run(events_rx, rx).await) });

    let addr = config.http_addr();
    let rpm = config.rate_limit_rpm();
    let cors = config.cors_origins().to_vec();
    tasks.spawn(async move { ("api", run_server(state, addr, rpm, &cors, shutdown_rx).await) });

    supervise(tasks, &shutdown_tx).await
}

/// Execute the serve command.
async fn run_serve_command(config: &Config) -> TrackerResult<()> {
    let repository = open_repository(config).await?;
    let latest = repository.latest_canonical_header().await?;

    if let Some(head) = &latest {
        info!(number = head.number, hash = %head.hash, "Serving from stored head");
    } else {
        warn!("Database has no canonical headers yet");
    }

    let status = StatusCache::new(0, latest);
    let state = AppState::new(repository, status.handle());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: JoinSet<(&'static str, TrackerResult<()>)> = JoinSet::new();

    let addr = config.http_addr();
    let rpm = config.rate_limit_rpm();
    let cors = config.cors_origins().to_vec();
    tasks.spawn(async move { ("api", run_server(state, addr, rpm, &cors, shutdown_rx).await) });

    supervise(tasks, &shutdown_tx).await
}

/// Wait for Ctrl-C or the first task to finish, then stop the rest.
///
/// Returns the first error any task produced.
async fn supervise(
    mut tasks: JoinSet<(&'static str, TrackerResult<()>)>,
    shutdown: &watch::Sender<bool>,
) -> TrackerResult<()> {
    let mut first_error: Option<TrackerError> = None;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutdown signal received");
            println!();
            println!("{}", "Shutting down gracefully...".yellow().bold());
        }
        Some(joined) = tasks.join_next() => {
            record(joined, &mut first_error);
        }
    }

    shutdown.send_replace(true);

    while let Some(joined) = tasks.join_next().await {
        record(joined, &mut first_error);
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            info!("Shutdown complete");
            Ok(())
        }
    }
}

fn record(
    joined: Result<(&'static str, TrackerResult<()>), tokio::task::JoinError>,
    first_error: &mut Option<TrackerError>,
) {
    let failure = match joined {
        Ok((task, Ok(()))) => {
            info!(task, "Task finished");
            return;
        }
        Ok((task, Err(e))) => {
            error!(task, error = %e, "Task failed");
            e
        }
        Err(e) => {
            error!(error = %e, "Task panicked or was cancelled");
            TrackerError::state(format!("Task aborted: {e}"), None)
        }
    };

    if first_error.is_none() {
        *first_error = Some(failure);
    }
}

/// Execute the orphans command.
async fn run_orphans_command(config: &Config, limit: i64) -> TrackerResult<()> {
    let repository = open_repository(config).await?;
    let (total, orphans) = repository.header_counts().await?;

    let filter = HeaderFilter {
        orphan: Some(true),
        limit: Some(limit),
        ..HeaderFilter::default()
    };
    let headers = repository.list_headers(&filter).await?;

    println!(
        "{} {} stored headers, {} orphaned",
        "Orphans".cyan().bold(),
        total.to_string().yellow(),
        orphans.to_string().red()
    );

    if headers.is_empty() {
        println!("{}", "No orphan headers recorded yet.".yellow());
        return Ok(());
    }

    for header in &headers {
        println!("{}", format_orphan(header));
    }

    Ok(())
}

fn format_orphan(header: &HeaderRecord) -> String {
    let when = chrono::DateTime::from_timestamp(header.timestamp, 0)
        .map_or_else(|| header.timestamp.to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());

    let origin = if header.uncle_by.is_empty() {
        "side".dimmed().to_string()
    } else {
        format!("uncle of {}", header.uncle_by.blue())
    };

    format!(
        "{} {} {} {} {}",
        header.number.to_string().yellow(),
        header.hash,
        when.dimmed(),
        origin,
        if header.error.is_empty() {
            String::new()
        } else {
            header.error.red().to_string()
        }
    )
    .trim_end()
    .to_string()
}
