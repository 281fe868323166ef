//! Canonical head conflict detection.

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::chain::ChainHeader;

/// Record of the last canonical head seen.
///
/// Stores the minimal information needed to verify chain continuity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadRecord {
    /// Block number
    pub number: u64,

    /// Block hash
    pub hash: B256,

    /// Parent block hash
    pub parent_hash: B256,
}

impl HeadRecord {
    /// Create a `HeadRecord` from a header.
    #[must_use]
    pub const fn from_header(header: &ChainHeader) -> Self {
        Self {
            number: header.header.number,
            hash: header.hash,
            parent_hash: header.header.parent_hash,
        }
    }
}

/// Why a canonical head does not simply extend the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Same height as the previous head with a different hash
    SameHeightDifferentHash,
    /// Height did not advance past the previous head
    HeightRegression,
    /// Parent hash is not the previous head's hash
    ParentMismatch,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SameHeightDifferentHash => write!(f, "same height, different hash"),
            Self::HeightRegression => write!(f, "height regression"),
            Self::ParentMismatch => write!(f, "parent mismatch"),
        }
    }
}

/// Canonical head continuity tracker.
///
/// Compares each new canonical head against the previous one. A head that
/// does not extend the previous head by exactly one parent link is a conflict
/// and must be stored with a full fetch.
///
/// ## Example
///
/// ```
/// use alloy::consensus::Header;
/// use orphan_tracker::chain::ChainHeader;
/// use orphan_tracker::reorg::ConflictDetector;
///
/// let parent = ChainHeader::sealed(Header { number: 1, ..Default::default() });
/// let child = ChainHeader::sealed(Header {
///     number: 2,
///     parent_hash: parent.hash,
///     ..Default::default()
/// });
///
/// let mut detector = ConflictDetector::new();
/// assert_eq!(detector.observe(&parent), None);
/// assert_eq!(detector.observe(&child), None);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConflictDetector {
    /// Last canonical head
    last_head: Option<HeadRecord>,

    /// Total number of conflicts detected
    conflict_count: u64,
}

impl ConflictDetector {
    /// Create a detector with no previous head.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_head: None,
            conflict_count: 0,
        }
    }

    /// Create a detector seeded with a known head.
    #[must_use]
    pub const fn with_head(head: HeadRecord) -> Self {
        Self {
            last_head: Some(head),
            conflict_count: 0,
        }
    }

    /// Get the last tracked head.
    #[must_use]
    pub const fn last_head(&self) -> Option<&HeadRecord> {
        self.last_head.as_ref()
    }

    /// Get the total number of detected conflicts.
    #[must_use]
    pub const fn conflict_count(&self) -> u64 {
        self.conflict_count
    }

    /// Classify `header` against the previous head without recording it.
    #[must_use]
    pub fn check(&self, header: &ChainHeader) -> Option<ConflictKind> {
        let prev = self.last_head.as_ref()?;
        let number = header.number();

        if number == prev.number && header.hash != prev.hash {
            Some(ConflictKind::SameHeightDifferentHash)
        } else if number <= prev.number {
            Some(ConflictKind::HeightRegression)
        } else if header.parent_hash() != prev.hash {
            Some(ConflictKind::ParentMismatch)
        } else {
            None
        }
    }

    /// Classify `header` and make it the new previous head.
    pub fn observe(&mut self, header: &ChainHeader) -> Option<ConflictKind> {
        let conflict = self.check(header);

        if let Some(kind) = conflict {
            self.conflict_count += 1;
            warn!(
                number = header.number(),
                hash = %header.hash,
                previous = ?self.last_head.map(|h| h.number),
                %kind,
                "Canonical head conflict"
            );
        } else {
            debug!(number = header.number(), hash = %header.hash, "Head extends chain");
        }

        self.last_head = Some(HeadRecord::from_header(header));
        conflict
    }
}
