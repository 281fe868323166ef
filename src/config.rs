//! Configuration management for the orphan block tracker.
//!
//! This module handles loading and validating configuration from environment variables
//! using the `dotenvy` crate. All operations return [`TrackerResult`] for comprehensive
//! error handling. Command-line flags are applied on top with [`Config::with_overrides`].
//!
//! ## Environment Variables
//!
//! Required for `track`:
//! - `RPC_TARGET`: WebSocket (`ws://`, `wss://`) or IPC endpoint of a node
//!   supporting `eth_subscribe("newSideHeads")`
//!
//! Optional (with defaults):
//! - `DATABASE_URL`: SQLite database (default: `sqlite:./orphans.db`)
//! - `HTTP_ADDR`: API listen address (default: `0.0.0.0:8080`)
//! - `TRAIL_DEPTH`: Blocks behind head for the confirmation pass (default: 10)
//! - `EVENT_BUFFER`: Head event channel capacity (default: 10000)
//! - `TRAIL_STRICT`: Treat confirmation pass failures as fatal (default: false)
//! - `MAX_RECONNECT_ATTEMPTS`: Resubscribe attempts before giving up (default: 10)
//! - `RATE_LIMIT_RPM`: API requests per minute (default: 600)
//! - `CORS_ORIGINS`: Comma-separated allowed origins (default: `*`)
//!
//! ## Example
//!
//! ```no_run
//! use orphan_tracker::config::Config;
//! use orphan_tracker::error::TrackerResult;
//!
//! # fn main() -> TrackerResult<()> {
//! let config = Config::from_env()?;
//! println!("Database: {}", config.database_url());
//! # Ok(())
//! # }
//! ```

use crate::error::{TrackerError, TrackerResult};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

const DEFAULT_DATABASE_URL: &str = "sqlite:./orphans.db";
const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Main configuration struct for the tracker.
#[derive(Debug, Clone)]
pub struct Config {
    /// Node endpoint (WebSocket URL or IPC path)
    rpc_target: Option<String>,

    /// SQLite connection string
    database_url: String,

    /// HTTP API listen address
    http_addr: SocketAddr,

    /// Distance behind the head at which the confirmation pass runs
    trail_depth: u64,

    /// Capacity of the head event channel
    event_buffer: usize,

    /// Whether confirmation pass failures stop the engine
    trail_strict: bool,

    /// Resubscribe attempts before a subscription failure becomes fatal
    max_reconnect_attempts: u32,

    /// Global API rate limit
    rate_limit_rpm: u32,

    /// Allowed CORS origins
    cors_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This function:
    /// 1. Loads `.env` file using `dotenvy` (if present)
    /// 2. Reads and validates all environment variables
    /// 3. Applies defaults for optional variables
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable holds an invalid value
    /// (non-numeric numbers, HTTP RPC targets, unparsable addresses).
    pub fn from_env() -> TrackerResult<Self> {
        // Load .env file if present (ignore error if file doesn't exist)
        dotenvy::dotenv().ok();

        Self::from_source(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_env`].
    pub fn from_source<F>(lookup: F) -> TrackerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_target = lookup("RPC_TARGET").filter(|target| !target.is_empty());
        if let Some(target) = &rpc_target {
            validate_rpc_target(target)?;
        }

        let database_url = lookup("DATABASE_URL")
            .map_or_else(|| DEFAULT_DATABASE_URL.to_string(), |path| database_url_from(&path));

        let http_addr = parse_var(&lookup, "HTTP_ADDR", DEFAULT_HTTP_ADDR)?;
        let trail_depth: u64 = parse_var(&lookup, "TRAIL_DEPTH", "10")?;
        if trail_depth == 0 {
            return Err(TrackerError::config("TRAIL_DEPTH must be at least 1", None));
        }

        let event_buffer: usize = parse_var(&lookup, "EVENT_BUFFER", "10000")?;
        if event_buffer == 0 {
            return Err(TrackerError::config("EVENT_BUFFER must be at least 1", None));
        }

        let trail_strict = parse_var(&lookup, "TRAIL_STRICT", "false")?;
        let max_reconnect_attempts = parse_var(&lookup, "MAX_RECONNECT_ATTEMPTS", "10")?;
        let rate_limit_rpm = parse_var(&lookup, "RATE_LIMIT_RPM", "600")?;

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(ToString::to_string)
            .collect();

        Ok(Self {
            rpc_target,
            database_url,
            http_addr,
            trail_depth,
            event_buffer,
            trail_strict,
            max_reconnect_attempts,
            rate_limit_rpm,
            cors_origins,
        })
    }

    /// Apply command-line overrides on top of the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the overriding RPC target is not a subscription-capable transport.
    pub fn with_overrides(
        mut self,
        rpc_target: Option<String>,
        db_path: Option<String>,
        http_addr: Option<SocketAddr>,
    ) -> TrackerResult<Self> {
        if let Some(target) = rpc_target {
            validate_rpc_target(&target)?;
            self.rpc_target = Some(target);
        }
        if let Some(path) = db_path {
            self.database_url = database_url_from(&path);
        }
        if let Some(addr) = http_addr {
            self.http_addr = addr;
        }
        Ok(self)
    }

    /// Get the node endpoint, failing when none was configured.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if neither `RPC_TARGET` nor `--rpc.target` is set.
    pub fn rpc_target(&self) -> TrackerResult<&str> {
        self.rpc_target.as_deref().ok_or_else(|| {
            TrackerError::config(
                "Please specify an RPC target (RPC_TARGET or --rpc.target)",
                None,
            )
        })
    }

    /// Get the SQLite connection string.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Get the API listen address.
    #[must_use]
    pub const fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Get the confirmation pass depth.
    #[must_use]
    pub const fn trail_depth(&self) -> u64 {
        self.trail_depth
    }

    /// Get the head event channel capacity.
    #[must_use]
    pub const fn event_buffer(&self) -> usize {
        self.event_buffer
    }

    /// Whether confirmation pass failures are fatal.
    #[must_use]
    pub const fn trail_strict(&self) -> bool {
        self.trail_strict
    }

    /// Get the resubscribe attempt limit.
    #[must_use]
    pub const fn max_reconnect_attempts(&self) -> u32 {
        self.max_reconnect_attempts
    }

    /// Get the API rate limit in requests per minute.
    #[must_use]
    pub const fn rate_limit_rpm(&self) -> u32 {
        self.rate_limit_rpm
    }

    /// Get the allowed CORS origins.
    #[must_use]
    pub fn cors_origins(&self) -> &[String] {
        &self.cors_origins
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: &str) -> TrackerResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .unwrap_or_else(|| default.to_string())
        .parse::<T>()
        .map_err(|e| TrackerError::config(format!("{key} has an invalid value"), Some(Box::new(e))))
}

/// Subscriptions need a persistent transport; plain HTTP is rejected.
fn validate_rpc_target(target: &str) -> TrackerResult<()> {
    if target.starts_with("http://") || target.starts_with("https://") {
        return Err(TrackerError::config(
            format!(
                "RPC target {target} uses HTTP, which does not support subscriptions. Use a ws://, wss:// or IPC endpoint"
            ),
            None,
        ));
    }
    Ok(())
}

fn database_url_from(path: &str) -> String {
    if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite:{path}")
    }
}
