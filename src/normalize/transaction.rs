//! Transaction normalization and sender recovery.

use super::to_i64;
use crate::chain::ChainTransaction;
use crate::db::models::TransactionRecord;
use crate::error::TrackerResult;
use alloy::consensus::Transaction;
use alloy::primitives::hex;
use tracing::debug;

/// Convert a transaction into a storage record.
///
/// The sender is recovered from the signature. Transactions replay-protected
/// for a different chain, or with a signature that does not recover, are kept
/// with an empty `from_address` and the reason in `error`.
///
/// # Errors
///
/// Returns a decoding error if the nonce does not fit a signed column.
pub fn normalize_transaction(
    tx: &ChainTransaction,
    chain_id: u64,
) -> TrackerResult<TransactionRecord> {
    let envelope = &tx.envelope;

    let (from_address, error) = match envelope.chain_id() {
        Some(tx_chain) if tx_chain != chain_id => (
            String::new(),
            format!("invalid chain id for signer: have {tx_chain} want {chain_id}"),
        ),
        _ => match envelope.recover_signer() {
            Ok(sender) => (hex::encode_prefixed(sender), String::new()),
            Err(e) => (String::new(), format!("sender recovery failed: {e}")),
        },
    };

    if !error.is_empty() {
        debug!(hash = %tx.hash, %error, "Transaction stored without sender");
    }

    Ok(TransactionRecord {
        hash: hex::encode_prefixed(tx.hash),
        from_address,
        to_address: envelope.kind().to().map(hex::encode_prefixed),
        data: hex::encode_prefixed(envelope.input()),
        gas_price: envelope
            .gas_price()
            .unwrap_or_else(|| envelope.max_fee_per_gas())
            .to_string(),
        gas_limit: envelope.gas_limit().to_string(),
        value: envelope.value().to_string(),
        nonce: to_i64(envelope.nonce(), "nonce")?,
        error,
        ..Default::default()
    })
}
