//! Node connections.
//!
//! Head subscriptions need a persistent transport, so only WebSocket and IPC
//! endpoints are supported.
//!
//! # Architecture
//!
//! ```text
//!   WebSocketProvider ── implements ──▶ ChainClient
//!          │                                │
//!    newHeads / newSideHeads          Supervisor, Reconciler
//!    eth_getBlockByHash/Number
//! ```

pub mod websocket;

pub use websocket::WebSocketProvider;
