//! Header normalization.

use super::{to_i64, to_u64};
use crate::chain::ChainHeader;
use crate::db::models::HeaderRecord;
use crate::error::{TrackerError, TrackerResult};
use alloy::consensus::constants::EMPTY_OMMER_ROOT_HASH;
use alloy::consensus::Header;
use alloy::primitives::{hex, Address, Bloom, Bytes, B256, B64, U256};
use std::str::FromStr;

/// Convert a header into a storage record.
///
/// `uncles` are the hashes the block cites, in order; the first two are kept
/// in `uncle1` and `uncle2`. `orphan`, `uncle_by` and timestamps are left at
/// their defaults.
///
/// # Errors
///
/// Returns a decoding error if a 64-bit quantity does not fit a signed column.
pub fn normalize_header(header: &ChainHeader, uncles: &[B256]) -> TrackerResult<HeaderRecord> {
    let h = &header.header;

    Ok(HeaderRecord {
        hash: hex::encode_prefixed(header.hash),
        parent_hash: hex::encode_prefixed(h.parent_hash),
        uncle_hash: hex::encode_prefixed(h.ommers_hash),
        miner: hex::encode_prefixed(h.beneficiary),
        state_root: hex::encode_prefixed(h.state_root),
        txes_root: hex::encode_prefixed(h.transactions_root),
        receipts_root: hex::encode_prefixed(h.receipts_root),
        logs_bloom: hex::encode_prefixed(h.logs_bloom.as_slice()),
        difficulty: h.difficulty.to_string(),
        number: to_i64(h.number, "number")?,
        gas_limit: to_i64(h.gas_limit, "gas_limit")?,
        gas_used: to_i64(h.gas_used, "gas_used")?,
        timestamp: to_i64(h.timestamp, "timestamp")?,
        extra_data: h.extra_data.to_vec(),
        mix_digest: hex::encode_prefixed(h.mix_hash),
        nonce: u64::from_be_bytes(h.nonce.0).to_string(),
        base_fee: optional_decimal(h.base_fee_per_gas),
        withdrawals_root: optional_hash(h.withdrawals_root),
        blob_gas_used: optional_decimal(h.blob_gas_used),
        excess_blob_gas: optional_decimal(h.excess_blob_gas),
        parent_beacon_block_root: optional_hash(h.parent_beacon_block_root),
        requests_hash: optional_hash(h.requests_hash),
        uncle1: uncles.first().map(hex::encode_prefixed).unwrap_or_default(),
        uncle2: uncles.get(1).map(hex::encode_prefixed).unwrap_or_default(),
        ..Default::default()
    })
}

/// Rebuild the consensus header from a stored record.
///
/// # Errors
///
/// Returns a decoding error if a stored field is not valid hex or decimal.
pub fn restore_header(record: &HeaderRecord) -> TrackerResult<Header> {
    Ok(Header {
        parent_hash: parse_field(&record.parent_hash, "parent_hash")?,
        ommers_hash: parse_field(&record.uncle_hash, "uncle_hash")?,
        beneficiary: parse_field::<Address>(&record.miner, "miner")?,
        state_root: parse_field(&record.state_root, "state_root")?,
        transactions_root: parse_field(&record.txes_root, "txes_root")?,
        receipts_root: parse_field(&record.receipts_root, "receipts_root")?,
        logs_bloom: parse_field::<Bloom>(&record.logs_bloom, "logs_bloom")?,
        difficulty: parse_field::<U256>(&record.difficulty, "difficulty")?,
        number: to_u64(record.number, "number")?,
        gas_limit: to_u64(record.gas_limit, "gas_limit")?,
        gas_used: to_u64(record.gas_used, "gas_used")?,
        timestamp: to_u64(record.timestamp, "timestamp")?,
        extra_data: Bytes::from(record.extra_data.clone()),
        mix_hash: parse_field(&record.mix_digest, "mix_digest")?,
        nonce: B64::new(parse_field::<u64>(&record.nonce, "nonce")?.to_be_bytes()),
        base_fee_per_gas: parse_optional(&record.base_fee, "base_fee")?,
        withdrawals_root: parse_optional(&record.withdrawals_root, "withdrawals_root")?,
        blob_gas_used: parse_optional(&record.blob_gas_used, "blob_gas_used")?,
        excess_blob_gas: parse_optional(&record.excess_blob_gas, "excess_blob_gas")?,
        parent_beacon_block_root: parse_optional(
            &record.parent_beacon_block_root,
            "parent_beacon_block_root",
        )?,
        requests_hash: parse_optional(&record.requests_hash, "requests_hash")?,
        ..Default::default()
    })
}

/// Whether the header commits to a non-empty uncle list.
#[must_use]
pub fn has_uncles(header: &ChainHeader) -> bool {
    header.header.ommers_hash != EMPTY_OMMER_ROOT_HASH
}

fn optional_decimal(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn optional_hash(value: Option<B256>) -> String {
    value.map(hex::encode_prefixed).unwrap_or_default()
}

fn parse_field<T>(value: &str, field: &str) -> TrackerResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| {
        TrackerError::decoding(format!("stored {field} {value:?} is invalid: {e}"), None)
    })
}

fn parse_optional<T>(value: &str, field: &str) -> TrackerResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if value.is_empty() {
        Ok(None)
    } else {
        parse_field(value, field).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256};

    fn london_header() -> Header {
        Header {
            parent_hash: b256!("1111111111111111111111111111111111111111111111111111111111111111"),
            ommers_hash: EMPTY_OMMER_ROOT_HASH,
            beneficiary: address!("AAaaAAAaaAAaaaAaaAaAaaaaaAaaAAaaaAAAAaAa"),
            state_root: b256!("2222222222222222222222222222222222222222222222222222222222222222"),
            difficulty: U256::from(17_179_869_184_u64),
            number: 12_965_000,
            gas_limit: 30_000_000,
            gas_used: 12_345_678,
            timestamp: 1_628_166_822,
            extra_data: Bytes::from_static(b"orphan-tracker"),
            nonce: B64::new(0x0123_4567_89ab_cdef_u64.to_be_bytes()),
            base_fee_per_gas: Some(1_000_000_000),
            ..Default::default()
        }
    }

    #[test]
    fn test_hex_fields_are_lowercase_prefixed() {
        let record = normalize_header(&ChainHeader::sealed(london_header()), &[]).unwrap();
        assert_eq!(record.miner, "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        assert!(record.hash.starts_with("0x"));
        assert_eq!(record.hash.len(), 66);
        assert_eq!(record.hash, record.hash.to_lowercase());
    }

    #[test]
    fn test_big_integers_become_decimal() {
        let record = normalize_header(&ChainHeader::sealed(london_header()), &[]).unwrap();
        assert_eq!(record.difficulty, "17179869184");
        assert_eq!(record.base_fee, "1000000000");
        assert_eq!(record.nonce, "81985529216486895");
        assert_eq!(record.number, 12_965_000);
    }

    #[test]
    fn test_base_fee_empty_before_london() {
        let header = Header {
            base_fee_per_gas: None,
            ..london_header()
        };
        let record = normalize_header(&ChainHeader::sealed(header), &[]).unwrap();
        assert_eq!(record.base_fee, "");
    }

    #[test]
    fn test_uncles_recorded() {
        let u1 = B256::repeat_byte(0xaa);
        let u2 = B256::repeat_byte(0xbb);
        let header = ChainHeader::sealed(london_header());

        let record = normalize_header(&header, &[u1, u2]).unwrap();
        assert_eq!(record.uncle1, hex::encode_prefixed(u1));
        assert_eq!(record.uncle2, hex::encode_prefixed(u2));

        let record = normalize_header(&header, &[u1]).unwrap();
        assert_eq!(record.uncle2, "");
    }

    #[test]
    fn test_round_trip_rederives_hash() {
        let header = ChainHeader::sealed(london_header());
        let record = normalize_header(&header, &[]).unwrap();
        let restored = restore_header(&record).unwrap();
        assert_eq!(restored.hash_slow(), header.hash);
    }

    #[test]
    fn test_round_trip_cancun_header() {
        let header = Header {
            withdrawals_root: Some(B256::repeat_byte(0x03)),
            blob_gas_used: Some(131_072),
            excess_blob_gas: Some(0),
            parent_beacon_block_root: Some(B256::repeat_byte(0x04)),
            ..london_header()
        };
        let sealed = ChainHeader::sealed(header);
        let record = normalize_header(&sealed, &[]).unwrap();
        assert_eq!(record.excess_blob_gas, "0");
        assert_eq!(restore_header(&record).unwrap().hash_slow(), sealed.hash);
    }

    #[test]
    fn test_has_uncles() {
        let plain = ChainHeader::sealed(london_header());
        assert!(!has_uncles(&plain));

        let with_uncles = ChainHeader::sealed(Header {
            ommers_hash: B256::repeat_byte(0x09),
            ..london_header()
        });
        assert!(has_uncles(&with_uncles));
    }

    #[test]
    fn test_restore_rejects_garbage() {
        let mut record = normalize_header(&ChainHeader::sealed(london_header()), &[]).unwrap();
        record.difficulty = "lots".to_string();
        assert!(restore_header(&record).is_err());
    }
}
