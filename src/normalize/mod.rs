//! Wire-to-record conversion.
//!
//! Pure functions turning node data into [`crate::db::models`] records:
//! hashes and addresses become `0x`-prefixed lowercase hex, big integers
//! become decimal strings. Nothing here touches the network or the store.

pub mod header;
pub mod transaction;

pub use header::{normalize_header, restore_header};
pub use transaction::normalize_transaction;

use crate::chain::ChainBlock;
use crate::db::models::{HeaderRecord, TransactionRecord};
use crate::error::{TrackerError, TrackerResult};

/// A block converted into storage records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedBlock {
    /// Header row, `orphan` and `uncle_by` left for the caller to set
    pub header: HeaderRecord,
    /// Transaction rows in block order
    pub transactions: Vec<TransactionRecord>,
}

/// Normalize a full block for the given chain.
///
/// Senders that cannot be recovered are recorded on the transaction row and
/// summarized on the header's `error` column.
///
/// # Errors
///
/// Returns a decoding error if a 64-bit quantity does not fit the store.
pub fn normalize_block(block: &ChainBlock, chain_id: u64) -> TrackerResult<NormalizedBlock> {
    let mut header = normalize_header(&block.header, &block.uncles)?;

    let transactions = block
        .transactions
        .iter()
        .map(|tx| normalize_transaction(tx, chain_id))
        .collect::<TrackerResult<Vec<_>>>()?;

    let failed = transactions.iter().filter(|tx| !tx.error.is_empty()).count();
    if failed > 0 {
        header.error = format!(
            "{failed} of {} transactions have an unrecoverable sender",
            transactions.len()
        );
    }

    Ok(NormalizedBlock {
        header,
        transactions,
    })
}

pub(crate) fn to_i64(value: u64, field: &str) -> TrackerResult<i64> {
    i64::try_from(value).map_err(|e| {
        TrackerError::decoding(
            format!("{field} value {value} exceeds the storable range"),
            Some(Box::new(e)),
        )
    })
}

pub(crate) fn to_u64(value: i64, field: &str) -> TrackerResult<u64> {
    u64::try_from(value).map_err(|e| {
        TrackerError::decoding(
            format!("{field} value {value} is negative"),
            Some(Box::new(e)),
        )
    })
}
