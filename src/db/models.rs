//! Database models that map to SQL tables.
//!
//! Records are produced by the normalizers in [`crate::normalize`] and are
//! stored as-is. Hashes and addresses are `0x`-prefixed lowercase hex, big
//! integers are decimal strings, and 64-bit quantities are stored as SQLite
//! `INTEGER` (`i64`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A block header as stored in the `headers` table.
///
/// One row per block hash. After insert only `orphan`, `uncle_by` and
/// `updated_at` change.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct HeaderRecord {
    /// Block hash (primary key)
    pub hash: String,
    /// Parent block hash
    pub parent_hash: String,
    /// Ommers digest from the header
    pub uncle_hash: String,
    /// Beneficiary address
    pub miner: String,
    /// State trie root
    pub state_root: String,
    /// Transactions trie root
    pub txes_root: String,
    /// Receipts trie root
    pub receipts_root: String,
    /// Logs bloom filter
    pub logs_bloom: String,
    /// Difficulty (decimal string)
    pub difficulty: String,
    /// Block number
    pub number: i64,
    /// Gas limit
    pub gas_limit: i64,
    /// Gas used
    pub gas_used: i64,
    /// Unix timestamp of the block
    pub timestamp: i64,
    /// Raw extra data
    pub extra_data: Vec<u8>,
    /// Mix digest
    pub mix_digest: String,
    /// Seal nonce (decimal string)
    pub nonce: String,
    /// Base fee per gas (decimal string, empty before London)
    pub base_fee: String,
    /// Withdrawals root (empty before Shanghai)
    pub withdrawals_root: String,
    /// Blob gas used (decimal string, empty before Cancun)
    pub blob_gas_used: String,
    /// Excess blob gas (decimal string, empty before Cancun)
    pub excess_blob_gas: String,
    /// Parent beacon block root (empty before Cancun)
    pub parent_beacon_block_root: String,
    /// Execution requests hash (empty before Prague)
    pub requests_hash: String,
    /// First uncle cited by this block
    pub uncle1: String,
    /// Second uncle cited by this block
    pub uncle2: String,
    /// Whether the block is off the canonical chain
    pub orphan: bool,
    /// Hash of the block that cites this one as an uncle
    pub uncle_by: String,
    /// Data-quality notes for the block
    pub error: String,
    /// Unix timestamp when the row was created
    pub created_at: i64,
    /// Unix timestamp of the last update
    pub updated_at: i64,
}

/// A transaction as stored in the `transactions` table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransactionRecord {
    /// Transaction hash (primary key)
    pub hash: String,
    /// Recovered sender, empty when recovery failed
    pub from_address: String,
    /// Recipient, `None` for contract creations
    pub to_address: Option<String>,
    /// Call data (hex)
    pub data: String,
    /// Gas price or fee cap (decimal string)
    pub gas_price: String,
    /// Gas limit (decimal string)
    pub gas_limit: String,
    /// Transferred value in wei (decimal string)
    pub value: String,
    /// Sender nonce
    pub nonce: i64,
    /// Sender recovery failure, empty when clean
    pub error: String,
    /// Unix timestamp when the row was created
    pub created_at: i64,
    /// Unix timestamp of the last update
    pub updated_at: i64,
}

/// Header columns that may be rewritten when a hash is stored again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutableColumn {
    /// `orphan`
    Orphan,
    /// `uncle_by`
    UncleBy,
}

impl MutableColumn {
    /// SQL column name.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Orphan => "orphan",
            Self::UncleBy => "uncle_by",
        }
    }
}

impl fmt::Display for MutableColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Maximum rows returned by a list query.
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Filters for listing headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFilter {
    /// Only orphaned (`true`) or only canonical (`false`) headers
    pub orphan: Option<bool>,
    /// Minimum block number (inclusive)
    pub number_min: Option<i64>,
    /// Maximum block number (inclusive)
    pub number_max: Option<i64>,
    /// Minimum timestamp (inclusive)
    pub timestamp_min: Option<i64>,
    /// Maximum timestamp (inclusive)
    pub timestamp_max: Option<i64>,
    /// Page size, clamped to [`MAX_PAGE_SIZE`]
    pub limit: Option<i64>,
    /// Rows to skip
    pub offset: Option<i64>,
}

impl HeaderFilter {
    /// Effective page size.
    #[must_use]
    pub fn limit(&self) -> i64 {
        clamp_limit(self.limit)
    }
}

/// Clamp a requested page size to `1..=MAX_PAGE_SIZE`, defaulting to the maximum.
#[must_use]
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.map_or(MAX_PAGE_SIZE, |l| l.clamp(1, MAX_PAGE_SIZE))
}
