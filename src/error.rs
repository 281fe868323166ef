//! Error types for the orphan block tracker.
//!
//! This module provides a unified error type [`TrackerError`] that encompasses
//! all possible errors that can occur while subscribing to the node,
//! reconciling head events and persisting records.
//!
//! # Design
//!
//! The error hierarchy is organized by layer:
//! - [`TrackerError::ConfigError`]: Configuration and environment issues
//! - [`TrackerError::RpcError`]: Node requests (block and chain ID fetches)
//! - [`TrackerError::DecodingError`]: Wire data that cannot be normalized
//! - [`TrackerError::StateError`]: Reconciliation invariants that do not hold
//! - [`TrackerError::DatabaseError`]: Store failures
//! - WebSocket variants: subscription lifecycle
//!
//! Subscription errors carry a transient/permanent classification through
//! [`TrackerError::is_transient`], which the subscription supervisor uses to
//! decide between resubscribing and shutting down.
//!
//! # Example
//!
//! ```
//! use orphan_tracker::error::{TrackerError, TrackerResult};
//!
//! fn validate_trail_depth(depth: u64) -> TrackerResult<()> {
//!     if depth == 0 {
//!         return Err(TrackerError::config(
//!             "trail depth cannot be zero",
//!             None
//!         ));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;

/// Result type alias using [`TrackerError`].
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Unified error type for the orphan block tracker.
#[derive(Debug)]
pub enum TrackerError {
    /// Configuration or environment variable errors.
    ///
    /// Variants include:
    /// - Missing or invalid environment variables
    /// - Unsupported RPC transports
    /// - Malformed configuration values
    ConfigError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// RPC provider or network errors.
    ///
    /// Variants include:
    /// - Block not found by hash or number
    /// - Chain ID request failures
    /// - RPC method errors
    RpcError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Wire data that cannot be converted into a storage record.
    DecodingError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Reconciliation state errors.
    StateError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database operation errors.
    ///
    /// Variants include:
    /// - Connection failures
    /// - Query execution errors
    /// - Migration failures
    /// - Transaction errors
    DatabaseError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// WebSocket connection errors.
    ///
    /// Raised when the transport to the node is unreachable. Transient.
    WebSocketConnectionError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// WebSocket subscription errors.
    ///
    /// Variants include:
    /// - Node does not support the subscription (e.g. `newSideHeads`)
    /// - Subscription rejected by the node
    ///
    /// Permanent.
    WebSocketSubscriptionError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// WebSocket disconnection error.
    ///
    /// Occurs when a subscription stream ends or lags behind
    /// and must be re-established. Transient.
    WebSocketDisconnected {
        /// Human-readable error message
        message: String,
    },

    /// Max reconnection attempts exceeded.
    ///
    /// Occurs when a subscription fails to re-establish after
    /// multiple attempts with exponential backoff.
    MaxReconnectAttemptsExceeded {
        /// Number of attempts made
        attempts: u32,
        /// Last error encountered
        last_error: String,
    },
}

impl TrackerError {
    /// Create a new configuration error.
    ///
    /// # Example
    ///
    /// ```
    /// use orphan_tracker::error::TrackerError;
    ///
    /// let err = TrackerError::config("RPC_TARGET not set", None);
    /// assert!(matches!(err, TrackerError::ConfigError { .. }));
    /// ```
    #[must_use]
    pub fn config(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ConfigError {
            message: message.into(),
            source,
        }
    }

    /// Create a new RPC error.
    ///
    /// # Example
    ///
    /// ```
    /// use orphan_tracker::error::TrackerError;
    ///
    /// let err = TrackerError::rpc("Block 100 not found", None);
    /// assert!(matches!(err, TrackerError::RpcError { .. }));
    /// ```
    #[must_use]
    pub fn rpc(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::RpcError {
            message: message.into(),
            source,
        }
    }

    /// Create a new decoding error.
    #[must_use]
    pub fn decoding(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::DecodingError {
            message: message.into(),
            source,
        }
    }

    /// Create a new state error.
    #[must_use]
    pub fn state(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::StateError {
            message: message.into(),
            source,
        }
    }

    /// Create a new database error.
    ///
    /// # Example
    ///
    /// ```
    /// use orphan_tracker::error::TrackerError;
    ///
    /// let err = TrackerError::database("Connection failed", None);
    /// assert!(matches!(err, TrackerError::DatabaseError { .. }));
    /// ```
    #[must_use]
    pub fn database(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::DatabaseError {
            message: message.into(),
            source,
        }
    }

    /// Create a new WebSocket connection error.
    #[must_use]
    pub fn websocket_connection(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::WebSocketConnectionError {
            message: message.into(),
            source,
        }
    }

    /// Create a new WebSocket subscription error.
    #[must_use]
    pub fn websocket_subscription(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::WebSocketSubscriptionError {
            message: message.into(),
            source,
        }
    }

    /// Create a new WebSocket disconnection error.
    ///
    /// # Example
    ///
    /// ```
    /// use orphan_tracker::error::TrackerError;
    ///
    /// let err = TrackerError::websocket_disconnected("Stream ended unexpectedly");
    /// assert!(err.is_transient());
    /// ```
    #[must_use]
    pub fn websocket_disconnected(message: impl Into<String>) -> Self {
        Self::WebSocketDisconnected {
            message: message.into(),
        }
    }

    /// Create a max reconnect attempts exceeded error.
    #[must_use]
    pub fn max_reconnect_exceeded(attempts: u32, last_error: impl Into<String>) -> Self {
        Self::MaxReconnectAttemptsExceeded {
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Whether the error describes a connectivity problem that a fresh
    /// subscription can recover from.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WebSocketDisconnected { .. } | Self::WebSocketConnectionError { .. }
        )
    }
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError { message, .. } => write!(f, "Configuration error: {message}"),
            Self::RpcError { message, .. } => write!(f, "RPC error: {message}"),
            Self::DecodingError { message, .. } => write!(f, "Decoding error: {message}"),
            Self::StateError { message, .. } => write!(f, "State error: {message}"),
            Self::DatabaseError { message, .. } => write!(f, "Database error: {message}"),
            Self::WebSocketConnectionError { message, .. } => {
                write!(f, "WebSocket connection error: {message}")
            }
            Self::WebSocketSubscriptionError { message, .. } => {
                write!(f, "WebSocket subscription error: {message}")
            }
            Self::WebSocketDisconnected { message } => {
                write!(f, "WebSocket disconnected: {message}")
            }
            Self::MaxReconnectAttemptsExceeded {
                attempts,
                last_error,
            } => {
                write!(
                    f,
                    "Max reconnection attempts ({attempts}) exceeded. Last error: {last_error}"
                )
            }
        }
    }
}

impl std::error::Error for TrackerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigError { source, .. }
            | Self::RpcError { source, .. }
            | Self::DecodingError { source, .. }
            | Self::StateError { source, .. }
            | Self::DatabaseError { source, .. }
            | Self::WebSocketConnectionError { source, .. }
            | Self::WebSocketSubscriptionError { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &dyn std::error::Error),
            Self::WebSocketDisconnected { .. } | Self::MaxReconnectAttemptsExceeded { .. } => None,
        }
    }
}
