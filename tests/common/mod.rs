//! In-memory chain and store fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use alloy::consensus::constants::EMPTY_OMMER_ROOT_HASH;
use alloy::consensus::Header;
use alloy::primitives::{keccak256, Bytes, B256, U256};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use orphan_tracker::chain::{ChainBlock, ChainClient, ChainHeader, HeadKind, HeadStream};
use orphan_tracker::db::{create_pool, Repository};
use orphan_tracker::error::{TrackerError, TrackerResult};
use orphan_tracker::observability::init_test_tracing;
use tempfile::TempDir;

/// Chain ID used by every fixture.
pub const CHAIN_ID: u64 = 1;

/// Build a block at `number` on top of `parent`.
///
/// `tag` goes into the extra data so siblings at the same height hash
/// differently.
pub fn block(number: u64, parent: B256, tag: u8, uncles: Vec<B256>) -> ChainBlock {
    let ommers_hash = if uncles.is_empty() {
        EMPTY_OMMER_ROOT_HASH
    } else {
        keccak256(uncles.iter().flat_map(|u| u.0).collect::<Vec<u8>>())
    };

    let header = Header {
        parent_hash: parent,
        ommers_hash,
        number,
        gas_limit: 30_000_000,
        timestamp: 1_700_000_000 + number * 12,
        difficulty: U256::from(2u64),
        extra_data: Bytes::from(vec![tag]),
        ..Header::default()
    };

    ChainBlock {
        header: ChainHeader::sealed(header),
        transactions: Vec::new(),
        uncles,
    }
}

/// A linear canonical chain `0..=tip` with tag 0.
pub fn canonical_chain(tip: u64) -> Vec<ChainBlock> {
    let mut blocks = Vec::new();
    let mut parent = B256::ZERO;
    for number in 0..=tip {
        let b = block(number, parent, 0, Vec::new());
        parent = b.header.hash;
        blocks.push(b);
    }
    blocks
}

/// Scripted in-memory node.
#[derive(Default)]
pub struct MockChain {
    blocks: Mutex<HashMap<B256, ChainBlock>>,
    canonical: Mutex<HashMap<u64, B256>>,
    fetched_by_hash: Mutex<Vec<B256>>,
    fetched_by_number: Mutex<Vec<u64>>,
    subscriptions: Mutex<HashMap<HeadKind, VecDeque<TrackerResult<HeadStream>>>>,
    subscribe_calls: Mutex<HashMap<HeadKind, usize>>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make a block fetchable by hash only.
    pub fn insert(&self, block: &ChainBlock) {
        self.blocks
            .lock()
            .unwrap()
            .insert(block.header.hash, block.clone());
    }

    /// Make a block fetchable by hash and the canonical block at its height.
    pub fn insert_canonical(&self, block: &ChainBlock) {
        self.insert(block);
        self.canonical
            .lock()
            .unwrap()
            .insert(block.header.number(), block.header.hash);
    }

    pub fn fetched_by_hash(&self) -> Vec<B256> {
        self.fetched_by_hash.lock().unwrap().clone()
    }

    pub fn fetched_by_number(&self) -> Vec<u64> {
        self.fetched_by_number.lock().unwrap().clone()
    }

    /// Queue the result of the next `subscribe(kind)` call. With nothing
    /// queued, subscriptions succeed and never yield.
    pub fn push_subscription(&self, kind: HeadKind, result: TrackerResult<HeadStream>) {
        self.subscriptions
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(result);
    }

    pub fn subscribe_calls(&self, kind: HeadKind) -> usize {
        self.subscribe_calls
            .lock()
            .unwrap()
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }
}

/// A stream yielding `items` and then staying open.
pub fn open_stream(items: Vec<TrackerResult<ChainHeader>>) -> HeadStream {
    stream::iter(items).chain(stream::pending()).boxed()
}

/// A stream yielding `items` and then ending.
pub fn closing_stream(items: Vec<TrackerResult<ChainHeader>>) -> HeadStream {
    stream::iter(items).boxed()
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> TrackerResult<u64> {
        Ok(CHAIN_ID)
    }

    async fn latest_header(&self) -> TrackerResult<ChainHeader> {
        let canonical = self.canonical.lock().unwrap();
        let blocks = self.blocks.lock().unwrap();
        canonical
            .iter()
            .max_by_key(|(number, _)| **number)
            .and_then(|(_, hash)| blocks.get(hash))
            .map(|b| b.header.clone())
            .ok_or_else(|| TrackerError::rpc("empty chain", None))
    }

    async fn block_by_hash(&self, hash: B256) -> TrackerResult<Option<ChainBlock>> {
        self.fetched_by_hash.lock().unwrap().push(hash);
        Ok(self.blocks.lock().unwrap().get(&hash).cloned())
    }

    async fn block_by_number(&self, number: u64) -> TrackerResult<Option<ChainBlock>> {
        self.fetched_by_number.lock().unwrap().push(number);
        let hash = self.canonical.lock().unwrap().get(&number).copied();
        Ok(hash.and_then(|h| self.blocks.lock().unwrap().get(&h).cloned()))
    }

    async fn subscribe(&self, kind: HeadKind) -> TrackerResult<HeadStream> {
        *self.subscribe_calls.lock().unwrap().entry(kind).or_default() += 1;
        let next = self
            .subscriptions
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| Ok(open_stream(Vec::new())))
    }
}

/// Fresh database in a temporary directory; keep the `TempDir` alive.
pub async fn test_repository() -> (TempDir, Arc<Repository>) {
    init_test_tracing();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite:{}", dir.path().join("tracker.db").display());
    let pool = create_pool(&url).await.expect("Failed to create pool");
    (dir, Arc::new(Repository::new(pool)))
}
