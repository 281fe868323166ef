//! WebSocket/IPC node client.
//!
//! Implements [`ChainClient`] on top of an Alloy pubsub provider. Head
//! notifications come from two subscriptions:
//!
//! - `eth_subscribe("newHeads")`: canonical head announcements
//! - `eth_subscribe("newSideHeads")`: blocks imported off the canonical
//!   chain (core-geth and compatible clients)
//!
//! Full blocks are fetched over the same connection. Transport failures are
//! classified here: a dropped backend is transient and triggers a reconnect,
//! anything the node answers with an error is permanent.

use std::time::Instant;

use alloy::{
    primitives::B256,
    providers::{Provider, ProviderBuilder, RootProvider},
    pubsub::Subscription,
    rpc::types::{Block, BlockNumberOrTag, BlockTransactions, BlockTransactionsKind, Header},
    transports::{BoxTransport, RpcError, TransportErrorKind},
};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::{broadcast::error::RecvError, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::chain::{ChainBlock, ChainClient, ChainHeader, ChainTransaction, HeadKind, HeadStream};
use crate::error::{TrackerError, TrackerResult};
use crate::supervisor::BackoffPolicy;

/// Pubsub provider for head subscriptions and block fetches.
///
/// # Example
///
/// ```no_run
/// use orphan_tracker::chain::{ChainClient, HeadKind};
/// use orphan_tracker::rpc::WebSocketProvider;
/// use futures_util::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let provider = WebSocketProvider::connect("ws://127.0.0.1:8546".to_string()).await?;
///     let mut heads = provider.subscribe(HeadKind::Side).await?;
///
///     while let Some(head) = heads.next().await {
///         println!("Side block {}", head?.number());
///     }
///     Ok(())
/// }
/// ```
pub struct WebSocketProvider {
    provider: RwLock<RootProvider<BoxTransport>>,
    url: String,
}

impl WebSocketProvider {
    /// Connects to a WebSocket URL or IPC path.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the endpoint is unreachable.
    #[instrument(skip(url), fields(host = tracing::field::Empty, duration_ms = tracing::field::Empty))]
    pub async fn connect(url: String) -> TrackerResult<Self> {
        let host = redact(&url);
        tracing::Span::current().record("host", host);

        let start = Instant::now();
        let provider = build(&url).await?;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::Span::current().record("duration_ms", duration_ms);
        info!(host, duration_ms, "Node connected");

        Ok(Self {
            provider: RwLock::new(provider),
            url,
        })
    }

    /// Connects, retrying transient failures with exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::MaxReconnectAttemptsExceeded`] when every attempt fails.
    pub async fn connect_with_retry(url: String, backoff: BackoffPolicy) -> TrackerResult<Self> {
        let mut attempt: u32 = 0;
        let mut delay = backoff.initial_delay;

        loop {
            match Self::connect(url.clone()).await {
                Ok(provider) => return Ok(provider),
                Err(e) => {
                    attempt += 1;
                    if attempt >= backoff.max_attempts {
                        error!(attempts = attempt, "Max connection attempts reached");
                        return Err(TrackerError::max_reconnect_exceeded(attempt, e.to_string()));
                    }

                    warn!(
                        attempt,
                        max_attempts = backoff.max_attempts,
                        error = %e,
                        "Node connection failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = backoff.next_delay(delay);
                }
            }
        }
    }

    /// Returns the endpoint this provider connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn current(&self) -> RootProvider<BoxTransport> {
        self.provider.read().await.clone()
    }

    /// Replace the underlying connection after the backend went away.
    async fn reconnect(&self) -> TrackerResult<()> {
        warn!(host = redact(&self.url), "Reconnecting to node");
        let provider = build(&self.url).await?;
        *self.provider.write().await = provider;
        info!("Node reconnected");
        Ok(())
    }

    async fn open(&self, kind: HeadKind) -> TrackerResult<Subscription<Header>> {
        let provider = self.current().await;
        match kind {
            HeadKind::Canonical => provider
                .subscribe_blocks()
                .await
                .map_err(|e| subscription_error(&e, "newHeads subscription failed")),
            HeadKind::Side => {
                let id = provider
                    .client()
                    .request("eth_subscribe", ("newSideHeads",))
                    .await
                    .map_err(|e| subscription_error(&e, "newSideHeads subscription failed"))?;
                provider
                    .get_subscription(id)
                    .await
                    .map_err(|e| subscription_error(&e, "newSideHeads subscription failed"))
            }
        }
    }
}

#[async_trait]
impl ChainClient for WebSocketProvider {
    async fn chain_id(&self) -> TrackerResult<u64> {
        self.current()
            .await
            .get_chain_id()
            .await
            .map_err(|e| classify(&e, "Failed to fetch chain ID"))
    }

    async fn latest_header(&self) -> TrackerResult<ChainHeader> {
        let block = self
            .current()
            .await
            .get_block_by_number(BlockNumberOrTag::Latest, BlockTransactionsKind::Hashes)
            .await
            .map_err(|e| classify(&e, "Failed to fetch latest block"))?
            .ok_or_else(|| TrackerError::rpc("Node returned no latest block", None))?;

        Ok(head_from_rpc(block.header))
    }

    #[instrument(skip(self))]
    async fn block_by_hash(&self, hash: B256) -> TrackerResult<Option<ChainBlock>> {
        let block = self
            .current()
            .await
            .get_block_by_hash(hash, BlockTransactionsKind::Full)
            .await
            .map_err(|e| classify(&e, &format!("Failed to fetch block {hash}")))?;

        block.map(block_from_rpc).transpose()
    }

    #[instrument(skip(self))]
    async fn block_by_number(&self, number: u64) -> TrackerResult<Option<ChainBlock>> {
        let block = self
            .current()
            .await
            .get_block_by_number(BlockNumberOrTag::Number(number), BlockTransactionsKind::Full)
            .await
            .map_err(|e| classify(&e, &format!("Failed to fetch block {number}")))?;

        block.map(block_from_rpc).transpose()
    }

    #[instrument(skip(self))]
    async fn subscribe(&self, kind: HeadKind) -> TrackerResult<HeadStream> {
        let sub = match self.open(kind).await {
            Ok(sub) => sub,
            Err(e) if e.is_transient() => {
                // Next attempt goes through a fresh connection
                if let Err(reconnect) = self.reconnect().await {
                    debug!(error = %reconnect, "Reconnect failed");
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        info!(%kind, "Head subscription active");

        let stream = stream::unfold(sub, move |mut sub| async move {
            let item = match sub.recv().await {
                Ok(header) => Ok(head_from_rpc(header)),
                Err(RecvError::Closed) => Err(TrackerError::websocket_disconnected(format!(
                    "{kind} subscription closed"
                ))),
                Err(RecvError::Lagged(missed)) => Err(TrackerError::websocket_disconnected(
                    format!("{kind} subscription lagged, {missed} notifications missed"),
                )),
            };
            Some((item, sub))
        });

        Ok(stream.boxed())
    }
}

async fn build(url: &str) -> TrackerResult<RootProvider<BoxTransport>> {
    ProviderBuilder::new().on_builtin(url).await.map_err(|e| {
        error!(error = %e, host = redact(url), "Node connection failed");
        TrackerError::websocket_connection(
            format!("Failed to connect to {}", redact(url)),
            Some(Box::new(e)),
        )
    })
}

fn head_from_rpc(header: Header) -> ChainHeader {
    ChainHeader {
        hash: header.hash,
        header: header.inner,
    }
}

fn block_from_rpc(block: Block) -> TrackerResult<ChainBlock> {
    let transactions = match block.transactions {
        BlockTransactions::Full(txs) => txs
            .into_iter()
            .map(|tx| ChainTransaction::from(tx.inner))
            .collect(),
        BlockTransactions::Uncle => Vec::new(),
        BlockTransactions::Hashes(hashes) if hashes.is_empty() => Vec::new(),
        BlockTransactions::Hashes(_) => {
            return Err(TrackerError::decoding(
                format!("Block {} returned without full transactions", block.header.hash),
                None,
            ))
        }
    };

    Ok(ChainBlock {
        header: head_from_rpc(block.header),
        transactions,
        uncles: block.uncles,
    })
}

/// Map a transport error onto the transient/permanent split.
fn classify(err: &RpcError<TransportErrorKind>, context: &str) -> TrackerError {
    let message = format!("{context}: {err}");
    if is_transient(err) {
        TrackerError::websocket_disconnected(message)
    } else {
        TrackerError::rpc(message, None)
    }
}

/// Like [`classify`], but permanent failures are subscription errors
/// (e.g. the node does not know `newSideHeads`).
fn subscription_error(err: &RpcError<TransportErrorKind>, context: &str) -> TrackerError {
    let message = format!("{context}: {err}");
    if is_transient(err) {
        TrackerError::websocket_disconnected(message)
    } else {
        TrackerError::websocket_subscription(message, None)
    }
}

fn is_transient(err: &RpcError<TransportErrorKind>) -> bool {
    match err {
        RpcError::Transport(TransportErrorKind::BackendGone) => true,
        RpcError::Transport(TransportErrorKind::Custom(inner)) => {
            inner.to_string().to_lowercase().contains("connection")
        }
        _ => false,
    }
}

/// Strip credentials and API keys from an endpoint for logging.
fn redact(url: &str) -> &str {
    let without_key = url.split("/v2/").next().unwrap_or(url);
    without_key.rsplit('@').next().unwrap_or(without_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_gone_is_transient() {
        let err: RpcError<TransportErrorKind> = RpcError::Transport(TransportErrorKind::BackendGone);
        assert!(classify(&err, "ctx").is_transient());
    }

    #[test]
    fn test_opaque_connection_error_is_transient() {
        let err = TransportErrorKind::custom_str("connection reset by peer");
        assert!(classify(&err, "ctx").is_transient());

        let err = TransportErrorKind::custom_str("invalid response");
        assert!(!classify(&err, "ctx").is_transient());
    }

    #[test]
    fn test_pubsub_unavailable_is_permanent() {
        let err: RpcError<TransportErrorKind> =
            RpcError::Transport(TransportErrorKind::PubsubUnavailable);
        let classified = subscription_error(&err, "ctx");
        assert!(!classified.is_transient());
        assert!(matches!(
            classified,
            TrackerError::WebSocketSubscriptionError { .. }
        ));
    }

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("wss://eth-mainnet.g.alchemy.com/v2/SECRET"),
            "wss://eth-mainnet.g.alchemy.com"
        );
        assert_eq!(redact("ws://user:pass@node:8546"), "node:8546");
        assert_eq!(redact("/var/run/geth.ipc"), "/var/run/geth.ipc");
    }

    #[tokio::test]
    #[ignore] // Requires a core-geth node at RPC_TARGET
    async fn test_side_head_subscription() {
        let url = std::env::var("RPC_TARGET").expect("RPC_TARGET not set");
        let provider = WebSocketProvider::connect(url).await.expect("Failed to connect");
        assert!(provider.subscribe(HeadKind::Side).await.is_ok());
    }
}
