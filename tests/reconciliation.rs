//! Integration tests for the reconciliation engine.
//!
//! Each test drives a [`Reconciler`] with hand-built head events against an
//! in-memory chain and a temporary SQLite database, then inspects the stored
//! rows.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::hex;
use common::{block, canonical_chain, test_repository, MockChain, CHAIN_ID};
use orphan_tracker::db::models::HeaderFilter;
use orphan_tracker::db::Repository;
use orphan_tracker::reorg::{HeadEvent, Reconciler, ReconcilerSettings};
use orphan_tracker::status::StatusCache;

fn reconciler(
    chain: &Arc<MockChain>,
    repository: &Arc<Repository>,
    trail_depth: u64,
) -> Reconciler<MockChain> {
    Reconciler::new(
        Arc::clone(chain),
        Arc::clone(repository),
        StatusCache::new(CHAIN_ID, None),
        CHAIN_ID,
        ReconcilerSettings {
            trail_depth,
            trail_strict: false,
        },
    )
}

/// At most one stored header per height may be canonical.
async fn assert_single_canonical_per_height(repository: &Repository) {
    let headers = repository.list_headers(&HeaderFilter::default()).await.unwrap();
    let mut canonical: HashMap<i64, usize> = HashMap::new();
    for header in headers.iter().filter(|h| !h.orphan) {
        *canonical.entry(header.number).or_default() += 1;
    }
    for (number, count) in canonical {
        assert!(count <= 1, "{count} canonical headers at {number}");
    }
}

#[tokio::test]
async fn test_side_head_before_canonical() {
    let (_dir, repository) = test_repository().await;
    let chain = MockChain::new();
    let blocks = canonical_chain(100);
    for b in &blocks {
        chain.insert_canonical(b);
    }
    let side = block(100, blocks[99].header.hash, 7, Vec::new());
    chain.insert(&side);

    let mut engine = reconciler(&chain, &repository, 1000);
    engine
        .handle_event(HeadEvent::Side(side.header.clone()))
        .await
        .unwrap();

    let stored_side = repository
        .get_header(&hex::encode_prefixed(side.header.hash))
        .await
        .unwrap()
        .expect("side block stored");
    assert!(stored_side.orphan);
    assert!(stored_side.uncle_by.is_empty());

    let stored_canonical = repository
        .get_header(&hex::encode_prefixed(blocks[100].header.hash))
        .await
        .unwrap()
        .expect("canonical block at the same height stored");
    assert!(!stored_canonical.orphan);

    assert_eq!(repository.count_canonical_at(100).await.unwrap(), 1);
    assert_eq!(chain.fetched_by_number(), vec![100]);
}

#[tokio::test]
async fn test_canonical_head_with_uncles() {
    let (_dir, repository) = test_repository().await;
    let chain = MockChain::new();
    let blocks = canonical_chain(100);
    for b in &blocks {
        chain.insert_canonical(b);
    }

    let uncle1 = block(100, blocks[99].header.hash, 1, Vec::new());
    let uncle2 = block(100, blocks[99].header.hash, 2, Vec::new());
    chain.insert(&uncle1);
    chain.insert(&uncle2);

    let head = block(
        101,
        blocks[100].header.hash,
        0,
        vec![uncle1.header.hash, uncle2.header.hash],
    );
    chain.insert_canonical(&head);

    let mut engine = reconciler(&chain, &repository, 1000).with_previous_head(&blocks[100].header);
    engine
        .handle_event(HeadEvent::Canonical(head.header.clone()))
        .await
        .unwrap();

    let head_hash = hex::encode_prefixed(head.header.hash);
    let stored_head = repository.get_header(&head_hash).await.unwrap().unwrap();
    assert!(!stored_head.orphan);
    assert_eq!(stored_head.uncle1, hex::encode_prefixed(uncle1.header.hash));
    assert_eq!(stored_head.uncle2, hex::encode_prefixed(uncle2.header.hash));

    for uncle in [&uncle1, &uncle2] {
        let stored = repository
            .get_header(&hex::encode_prefixed(uncle.header.hash))
            .await
            .unwrap()
            .expect("uncle stored");
        assert!(stored.orphan);
        assert_eq!(stored.uncle_by, head_hash);
    }

    let canonical_100 = repository
        .get_header(&hex::encode_prefixed(blocks[100].header.hash))
        .await
        .unwrap()
        .expect("canonical block at uncle height stored");
    assert!(!canonical_100.orphan);

    assert_single_canonical_per_height(&repository).await;
}

#[tokio::test]
async fn test_parent_mismatch_forces_full_store() {
    let (_dir, repository) = test_repository().await;
    let chain = MockChain::new();
    let blocks = canonical_chain(49);
    for b in &blocks {
        chain.insert_canonical(b);
    }

    // New head at 50 builds on a 49 we never saw as head
    let other_49 = block(49, blocks[48].header.hash, 3, Vec::new());
    chain.insert_canonical(&other_49);
    let head = block(50, other_49.header.hash, 0, Vec::new());
    chain.insert_canonical(&head);

    let mut engine = reconciler(&chain, &repository, 1000).with_previous_head(&blocks[49].header);
    engine
        .handle_event(HeadEvent::Canonical(head.header.clone()))
        .await
        .unwrap();

    let stored = repository
        .get_header(&hex::encode_prefixed(head.header.hash))
        .await
        .unwrap()
        .expect("conflicting head stored");
    assert!(!stored.orphan);
    assert_eq!(chain.fetched_by_hash(), vec![head.header.hash]);
    assert_eq!(engine.detector().conflict_count(), 1);
}

#[tokio::test]
async fn test_extending_head_takes_cheap_path() {
    let (_dir, repository) = test_repository().await;
    let chain = MockChain::new();
    let blocks = canonical_chain(20);
    for b in &blocks {
        chain.insert_canonical(b);
    }

    let mut engine = reconciler(&chain, &repository, 1000).with_previous_head(&blocks[19].header);
    let status = engine.status_handle();
    engine
        .handle_event(HeadEvent::Canonical(blocks[20].header.clone()))
        .await
        .unwrap();

    assert!(chain.fetched_by_hash().is_empty());
    assert!(repository
        .get_header(&hex::encode_prefixed(blocks[20].header.hash))
        .await
        .unwrap()
        .is_none());

    let latest = status.latest_header().expect("status updated");
    assert_eq!(latest.number, 20);
    assert!(!latest.orphan);
}

#[tokio::test]
async fn test_trailing_pass_fills_missing_height() {
    let (_dir, repository) = test_repository().await;
    let chain = MockChain::new();
    let blocks = canonical_chain(10);
    for b in &blocks {
        chain.insert_canonical(b);
    }

    let mut engine = reconciler(&chain, &repository, 2).with_previous_head(&blocks[9].header);
    engine
        .handle_event(HeadEvent::Canonical(blocks[10].header.clone()))
        .await
        .unwrap();

    assert_eq!(chain.fetched_by_number(), vec![8]);
    let stored = repository
        .get_header(&hex::encode_prefixed(blocks[8].header.hash))
        .await
        .unwrap()
        .expect("trailing block stored");
    assert!(!stored.orphan);
    assert_eq!(repository.count_canonical_at(8).await.unwrap(), 1);
}

#[tokio::test]
async fn test_trailing_pass_skips_confirmed_height() {
    let (_dir, repository) = test_repository().await;
    let chain = MockChain::new();
    let blocks = canonical_chain(10);
    for b in &blocks {
        chain.insert_canonical(b);
    }

    let mut engine = reconciler(&chain, &repository, 2).with_previous_head(&blocks[9].header);
    engine
        .handle_event(HeadEvent::Canonical(blocks[10].header.clone()))
        .await
        .unwrap();
    engine
        .handle_event(HeadEvent::Canonical(blocks[10].header.clone()))
        .await
        .unwrap();

    // Height 8 was filled by the first pass and is only counted the second time
    assert_eq!(chain.fetched_by_number(), vec![8]);
}

#[tokio::test]
async fn test_trailing_failure_tolerated_unless_strict() {
    let (_dir, repository) = test_repository().await;
    let chain = MockChain::new();
    let blocks = canonical_chain(10);
    // Height 8 is unknown to the node
    for b in blocks.iter().filter(|b| b.header.number() != 8) {
        chain.insert_canonical(b);
    }

    let mut lenient = reconciler(&chain, &repository, 2).with_previous_head(&blocks[9].header);
    assert!(lenient
        .handle_event(HeadEvent::Canonical(blocks[10].header.clone()))
        .await
        .is_ok());

    let mut strict = Reconciler::new(
        Arc::clone(&chain),
        Arc::clone(&repository),
        StatusCache::new(CHAIN_ID, None),
        CHAIN_ID,
        ReconcilerSettings {
            trail_depth: 2,
            trail_strict: true,
        },
    )
    .with_previous_head(&blocks[9].header);
    assert!(strict
        .handle_event(HeadEvent::Canonical(blocks[10].header.clone()))
        .await
        .is_err());
}

#[tokio::test]
async fn test_missing_side_block_is_fatal() {
    let (_dir, repository) = test_repository().await;
    let chain = MockChain::new();
    let ghost = block(5, alloy::primitives::B256::ZERO, 9, Vec::new());

    let mut engine = reconciler(&chain, &repository, 1000);
    assert!(engine
        .handle_event(HeadEvent::Side(ghost.header.clone()))
        .await
        .is_err());
}

#[tokio::test]
async fn test_reorg_demotes_previous_canonical() {
    let (_dir, repository) = test_repository().await;
    let chain = MockChain::new();
    let blocks = canonical_chain(100);
    for b in &blocks {
        chain.insert_canonical(b);
    }

    let mut engine = reconciler(&chain, &repository, 1000).with_previous_head(&blocks[99].header);

    // 100a becomes canonical and is stored through a side notification of 100b
    let replacement = block(100, blocks[99].header.hash, 5, Vec::new());
    chain.insert(&replacement);
    engine
        .handle_event(HeadEvent::Canonical(blocks[100].header.clone()))
        .await
        .unwrap();
    engine
        .handle_event(HeadEvent::Side(replacement.header.clone()))
        .await
        .unwrap();

    // The node switches to 100b
    chain.insert_canonical(&replacement);
    engine
        .handle_event(HeadEvent::Canonical(replacement.header.clone()))
        .await
        .unwrap();

    let old = repository
        .get_header(&hex::encode_prefixed(blocks[100].header.hash))
        .await
        .unwrap()
        .unwrap();
    let new = repository
        .get_header(&hex::encode_prefixed(replacement.header.hash))
        .await
        .unwrap()
        .unwrap();
    assert!(old.orphan);
    assert!(!new.orphan);
    assert_eq!(repository.count_canonical_at(100).await.unwrap(), 1);
    assert_single_canonical_per_height(&repository).await;
}

#[tokio::test]
async fn test_uncle_expansion_depth_bounded() {
    let (_dir, repository) = test_repository().await;
    let chain = MockChain::new();
    let blocks = canonical_chain(101);
    for b in &blocks {
        chain.insert_canonical(b);
    }

    let deepest = block(97, blocks[96].header.hash, 3, Vec::new());
    let second = block(98, blocks[97].header.hash, 2, vec![deepest.header.hash]);
    let first = block(99, blocks[98].header.hash, 1, vec![second.header.hash]);
    for b in [&deepest, &second, &first] {
        chain.insert(b);
    }

    let head = block(102, blocks[101].header.hash, 0, vec![first.header.hash]);
    chain.insert_canonical(&head);

    let mut engine = reconciler(&chain, &repository, 1000).with_previous_head(&blocks[101].header);
    engine
        .handle_event(HeadEvent::Canonical(head.header.clone()))
        .await
        .unwrap();

    let first_row = repository
        .get_header(&hex::encode_prefixed(first.header.hash))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first_row.uncle_by, hex::encode_prefixed(head.header.hash));

    let second_row = repository
        .get_header(&hex::encode_prefixed(second.header.hash))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second_row.uncle_by, hex::encode_prefixed(first.header.hash));

    assert!(repository
        .get_header(&hex::encode_prefixed(deepest.header.hash))
        .await
        .unwrap()
        .is_none());
    assert!(!chain.fetched_by_hash().contains(&deepest.header.hash));
    assert_single_canonical_per_height(&repository).await;
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let (_dir, repository) = test_repository().await;
    let chain = MockChain::new();
    let (events_tx, events_rx) = tokio::sync::mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let engine = reconciler(&chain, &repository, 1000);
    let handle = tokio::spawn(engine.run(events_rx, shutdown_rx));

    shutdown_tx.send(true).unwrap();
    assert!(handle.await.unwrap().is_ok());
    drop(events_tx);
}
