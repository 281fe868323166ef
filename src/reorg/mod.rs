//! Reorg-aware reconciliation of head events.
//!
//! This module decides, for every block the node announces, whether it is
//! canonical, orphaned or an uncle, and keeps the store consistent with that
//! decision:
//! - Side heads are stored as orphans, then the canonical block at the same
//!   height is fetched and stored
//! - Canonical heads demote their stored siblings, update the status cache,
//!   and are fully stored when they cite uncles or break continuity
//! - Cited uncles are stored with `uncle_by` pointing at the citing block
//! - A trailing pass re-checks the height `trail_depth` blocks behind each
//!   head and repairs it when it has no single canonical row
//!
//! ## How It Works
//!
//! 1. **Single owner**: one [`Reconciler`] task owns all reconciliation state
//! 2. **Work queue**: follow-up fetches (uncles, canonical-at-height, trailing
//!    checks) go through an explicit queue with a depth counter
//! 3. **Continuity check**: [`ConflictDetector`] compares each canonical head
//!    with the previous one
//!
//! ## Example
//!
//! ```rust,ignore
//! use orphan_tracker::reorg::{Reconciler, ReconcilerSettings};
//!
//! let reconciler = Reconciler::new(client, repository, status, chain_id, ReconcilerSettings::default());
//! reconciler.run(events, shutdown).await?;
//! ```

pub mod conflict;
pub mod engine;

pub use conflict::{ConflictDetector, ConflictKind, HeadRecord};
pub use engine::{HeadEvent, Reconciler, ReconcilerSettings, MAX_UNCLE_DEPTH};
