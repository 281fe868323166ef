//! Chain data model and the node client seam.
//!
//! Everything above this module (normalizers, reconciliation, supervisor) talks
//! to the node through [`ChainClient`], so the reconciliation engine can be
//! driven by the real WebSocket/IPC provider in production and by an in-memory
//! chain in tests.

use crate::error::TrackerResult;
use alloy::consensus::{Header, TxEnvelope};
use alloy::primitives::B256;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::fmt;

/// A block header together with the hash the node reported for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHeader {
    /// Block hash
    pub hash: B256,
    /// Consensus header fields
    pub header: Header,
}

impl ChainHeader {
    /// Wrap a header, deriving its hash from the RLP encoding.
    #[must_use]
    pub fn sealed(header: Header) -> Self {
        Self {
            hash: header.hash_slow(),
            header,
        }
    }

    /// Block number.
    #[must_use]
    pub const fn number(&self) -> u64 {
        self.header.number
    }

    /// Parent block hash.
    #[must_use]
    pub const fn parent_hash(&self) -> B256 {
        self.header.parent_hash
    }
}

/// A transaction with its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    /// Transaction hash
    pub hash: B256,
    /// Signed transaction
    pub envelope: TxEnvelope,
}

impl From<TxEnvelope> for ChainTransaction {
    fn from(envelope: TxEnvelope) -> Self {
        Self {
            hash: *envelope.tx_hash(),
            envelope,
        }
    }
}

/// A full block: header, transactions and the hashes of the uncles it cites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlock {
    /// Block header
    pub header: ChainHeader,
    /// Full transactions in block order
    pub transactions: Vec<ChainTransaction>,
    /// Uncle hashes in citation order
    pub uncles: Vec<B256>,
}

/// Which head subscription an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeadKind {
    /// `newHeads`: the node's canonical head advanced
    Canonical,
    /// `newSideHeads`: the node imported a block off the canonical chain
    Side,
}

impl fmt::Display for HeadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canonical => write!(f, "canonical"),
            Self::Side => write!(f, "side"),
        }
    }
}

/// Stream of head notifications. Errors are delivered in-band; a stream that
/// ends without an error means the subscription was closed.
pub type HeadStream = BoxStream<'static, TrackerResult<ChainHeader>>;

/// Node operations the tracker depends on.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Network chain ID.
    async fn chain_id(&self) -> TrackerResult<u64>;

    /// Current canonical head.
    async fn latest_header(&self) -> TrackerResult<ChainHeader>;

    /// Full block by hash. `None` when the node does not know the block.
    async fn block_by_hash(&self, hash: B256) -> TrackerResult<Option<ChainBlock>>;

    /// Canonical block at a height. `None` when the height is beyond the head.
    async fn block_by_number(&self, number: u64) -> TrackerResult<Option<ChainBlock>>;

    /// Open a head subscription of the given kind.
    async fn subscribe(&self, kind: HeadKind) -> TrackerResult<HeadStream>;
}
