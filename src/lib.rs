//! # Orphan Tracker
//!
//! Reorg-aware recorder of orphan, side and uncle Ethereum blocks, built on
//! [Alloy](https://github.com/alloy-rs/alloy).
//!
//! The tracker subscribes to both canonical head announcements (`newHeads`)
//! and side head announcements (`newSideHeads`, core-geth), decides which
//! blocks are canonical, orphaned or uncled, and writes idempotent records to
//! SQLite. A small HTTP API serves the results.
//!
//! ## Architecture
//!
//! 1. **Normalizers** ([`normalize`]) - wire headers and transactions to rows
//! 2. **Upsert engine** ([`db`]) - per-hash insert-or-selective-update, links,
//!    sibling demotion
//! 3. **Reconciliation engine** ([`reorg`]) - single-owner event loop with a
//!    work queue for uncle expansion and the trailing confirmation pass
//! 4. **Subscription supervisor** ([`supervisor`]) - resubscribes on transient
//!    failures with jittered backoff
//! 5. **Status cache** ([`status`]) - latest canonical header for the API
//! 6. **HTTP API** ([`api`]) - `/api/v1/{ping,status,health,headers,transactions}`
//!
//! The node is reached through the [`chain::ChainClient`] trait, implemented
//! for WebSocket and IPC endpoints by [`rpc::WebSocketProvider`].
//!
//! ## Quick Start
//!
//! ```bash
//! RPC_TARGET=ws://127.0.0.1:8546 orphan-tracker track
//! curl 'http://localhost:8080/api/v1/headers?orphan=true&limit=10'
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`error::TrackerResult<T>`](error::TrackerResult):
//!
//! ```rust
//! use orphan_tracker::error::{TrackerError, TrackerResult};
//!
//! fn example() -> TrackerResult<()> {
//!     Err(TrackerError::websocket_disconnected("stream closed"))
//! }
//!
//! assert!(example().unwrap_err().is_transient());
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod app_state;
pub mod chain;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod normalize;
pub mod observability;
pub mod reorg;
pub mod rpc;
pub mod status;
pub mod supervisor;
