//! API request and response models.
//!
//! Field names follow the JSON shape long-standing consumers of the orphan
//! database expect (`parentHash`, `sha3Uncles`, `uncleBy`, ...), which differs
//! from the snake_case column names in [`crate::db::models`].

use alloy::primitives::hex;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::db::models::{HeaderFilter, HeaderRecord, TransactionRecord};
use crate::status::StatusSnapshot;

/// A stored block header.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HeaderInfo {
    /// Block hash
    pub hash: String,
    /// Parent block hash
    #[serde(rename = "parentHash")]
    pub parent_hash: String,
    /// Ommers digest
    #[serde(rename = "sha3Uncles")]
    pub uncle_hash: String,
    /// Beneficiary address
    pub miner: String,
    /// State trie root
    #[serde(rename = "stateRoot")]
    pub state_root: String,
    /// Transactions trie root
    #[serde(rename = "transactionsRoot")]
    pub txes_root: String,
    /// Receipts trie root
    #[serde(rename = "receiptsRoot")]
    pub receipts_root: String,
    /// Logs bloom filter
    #[serde(rename = "logsBloom")]
    pub logs_bloom: String,
    /// Difficulty (decimal)
    pub difficulty: String,
    /// Block number
    pub number: i64,
    /// Gas limit
    #[serde(rename = "gasLimit")]
    pub gas_limit: i64,
    /// Gas used
    #[serde(rename = "gasUsed")]
    pub gas_used: i64,
    /// Block timestamp (unix seconds)
    pub timestamp: i64,
    /// Extra data (hex)
    #[serde(rename = "extraData")]
    pub extra_data: String,
    /// Mix digest
    #[serde(rename = "mixHash")]
    pub mix_digest: String,
    /// Seal nonce (decimal)
    pub nonce: String,
    /// Base fee per gas (decimal)
    #[serde(rename = "baseFeePerGas", default, skip_serializing_if = "String::is_empty")]
    pub base_fee: String,
    /// Withdrawals root
    #[serde(rename = "withdrawalsRoot", default, skip_serializing_if = "String::is_empty")]
    pub withdrawals_root: String,
    /// Blob gas used (decimal)
    #[serde(rename = "blobGasUsed", default, skip_serializing_if = "String::is_empty")]
    pub blob_gas_used: String,
    /// Excess blob gas (decimal)
    #[serde(rename = "excessBlobGas", default, skip_serializing_if = "String::is_empty")]
    pub excess_blob_gas: String,
    /// Parent beacon block root
    #[serde(
        rename = "parentBeaconBlockRoot",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub parent_beacon_block_root: String,
    /// Execution requests hash
    #[serde(rename = "requestsHash", default, skip_serializing_if = "String::is_empty")]
    pub requests_hash: String,
    /// First cited uncle
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uncle1: String,
    /// Second cited uncle
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uncle2: String,
    /// Whether the block is off the canonical chain
    pub orphan: bool,
    /// Block citing this one as an uncle
    #[serde(rename = "uncleBy")]
    pub uncle_by: String,
    /// Data-quality notes
    pub error: String,
    /// Transactions included in this block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txes: Option<Vec<TransactionInfo>>,
    /// Row creation time (unix seconds)
    pub created_at: i64,
    /// Last update time (unix seconds)
    pub updated_at: i64,
}

impl From<HeaderRecord> for HeaderInfo {
    fn from(record: HeaderRecord) -> Self {
        Self {
            hash: record.hash,
            parent_hash: record.parent_hash,
            uncle_hash: record.uncle_hash,
            miner: record.miner,
            state_root: record.state_root,
            txes_root: record.txes_root,
            receipts_root: record.receipts_root,
            logs_bloom: record.logs_bloom,
            difficulty: record.difficulty,
            number: record.number,
            gas_limit: record.gas_limit,
            gas_used: record.gas_used,
            timestamp: record.timestamp,
            extra_data: hex::encode_prefixed(&record.extra_data),
            mix_digest: record.mix_digest,
            nonce: record.nonce,
            base_fee: record.base_fee,
            withdrawals_root: record.withdrawals_root,
            blob_gas_used: record.blob_gas_used,
            excess_blob_gas: record.excess_blob_gas,
            parent_beacon_block_root: record.parent_beacon_block_root,
            requests_hash: record.requests_hash,
            uncle1: record.uncle1,
            uncle2: record.uncle2,
            orphan: record.orphan,
            uncle_by: record.uncle_by,
            error: record.error,
            txes: None,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// A stored transaction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionInfo {
    /// Transaction hash
    pub hash: String,
    /// Recovered sender
    pub from: String,
    /// Recipient, absent for contract creations
    pub to: Option<String>,
    /// Call data (hex)
    pub data: String,
    /// Gas price or fee cap (decimal)
    #[serde(rename = "gasPrice")]
    pub gas_price: String,
    /// Gas limit (decimal)
    #[serde(rename = "gasLimit")]
    pub gas_limit: String,
    /// Value in wei (decimal)
    pub value: String,
    /// Sender nonce
    pub nonce: i64,
    /// Sender recovery failure
    pub error: String,
    /// Headers that include this transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<HeaderInfo>>,
    /// Row creation time (unix seconds)
    pub created_at: i64,
    /// Last update time (unix seconds)
    pub updated_at: i64,
}

impl From<TransactionRecord> for TransactionInfo {
    fn from(record: TransactionRecord) -> Self {
        Self {
            hash: record.hash,
            from: record.from_address,
            to: record.to_address,
            data: record.data,
            gas_price: record.gas_price,
            gas_limit: record.gas_limit,
            value: record.value,
            nonce: record.nonce,
            error: record.error,
            headers: None,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Process status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    /// Seconds since the process started
    pub uptime: i64,
    /// Network chain ID (0 when unknown)
    pub chain_id: u64,
    /// Latest canonical header seen
    pub latest_header: Option<HeaderInfo>,
}

impl From<StatusSnapshot> for StatusResponse {
    fn from(snapshot: StatusSnapshot) -> Self {
        Self {
            uptime: snapshot.uptime,
            chain_id: snapshot.chain_id,
            latest_header: snapshot.latest_header.map(HeaderInfo::from),
        }
    }
}

/// Page of headers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HeaderListResponse {
    /// Headers, newest first
    pub data: Vec<HeaderInfo>,
    /// Pagination metadata
    pub pagination: PaginationInfo,
}

/// Page of transactions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionListResponse {
    /// Transactions, newest first
    pub data: Vec<TransactionInfo>,
    /// Pagination metadata
    pub pagination: PaginationInfo,
}

/// Pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginationInfo {
    /// Effective page size (0 for raw queries)
    pub limit: i64,
    /// Rows skipped
    pub offset: i64,
    /// Rows in this page
    pub count: usize,
}

/// Query parameters for listing headers.
#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
pub struct HeadersQuery {
    /// Only orphaned (`true`) or only canonical (`false`) headers
    pub orphan: Option<bool>,
    /// Minimum block number
    pub number_min: Option<i64>,
    /// Maximum block number
    pub number_max: Option<i64>,
    /// Minimum timestamp (unix seconds)
    pub timestamp_min: Option<i64>,
    /// Maximum timestamp (unix seconds)
    pub timestamp_max: Option<i64>,
    /// Page size (max 1000)
    pub limit: Option<i64>,
    /// Rows to skip
    pub offset: Option<i64>,
    /// Attach transactions to each header (default true)
    pub include_txes: Option<bool>,
    /// Read-only SQL selecting header rows; filters are ignored when set
    pub raw_sql: Option<String>,
}

impl HeadersQuery {
    /// Store filter for these parameters.
    #[must_use]
    pub fn filter(&self) -> HeaderFilter {
        HeaderFilter {
            orphan: self.orphan,
            number_min: self.number_min,
            number_max: self.number_max,
            timestamp_min: self.timestamp_min,
            timestamp_max: self.timestamp_max,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// Query parameters for listing transactions.
#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
pub struct TransactionsQuery {
    /// Page size (max 1000)
    pub limit: Option<i64>,
    /// Rows to skip
    pub offset: Option<i64>,
    /// Attach including headers to each transaction (default true)
    pub include_headers: Option<bool>,
    /// Read-only SQL selecting transaction rows
    pub raw_sql: Option<String>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Overall health status
    pub status: HealthStatus,
    /// Application version
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: i64,
    /// Network chain ID (0 when unknown)
    pub chain_id: u64,
    /// Number of the latest canonical head seen
    pub latest_block: Option<i64>,
    /// Stored canonical headers
    pub canonical_headers: i64,
    /// Stored orphan headers
    pub orphan_headers: i64,
    /// Database status
    pub database_status: HealthStatus,
}

/// Health status states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All services healthy
    Healthy,
    /// Serving, but no head seen yet
    Degraded,
    /// Store unreachable
    Unhealthy,
}

/// Error response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error type
    pub error: String,
    /// Human-readable message
    pub message: String,
    /// Optional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_info_json_names() {
        let info = HeaderInfo::from(HeaderRecord {
            hash: "0xab".to_string(),
            parent_hash: "0xcd".to_string(),
            extra_data: vec![0xde, 0xad],
            uncle_by: "0xef".to_string(),
            ..Default::default()
        });

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["parentHash"], "0xcd");
        assert_eq!(json["extraData"], "0xdead");
        assert_eq!(json["uncleBy"], "0xef");
        assert!(json.get("baseFeePerGas").is_none());
        assert!(json.get("uncle1").is_none());
        assert!(json.get("txes").is_none());
    }

    #[test]
    fn test_transaction_info_json_names() {
        let info = TransactionInfo::from(TransactionRecord {
            hash: "0x01".to_string(),
            from_address: "0x02".to_string(),
            to_address: None,
            gas_price: "7".to_string(),
            ..Default::default()
        });

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["from"], "0x02");
        assert!(json["to"].is_null());
        assert_eq!(json["gasPrice"], "7");
        assert!(json.get("headers").is_none());
    }

    #[test]
    fn test_headers_query_filter() {
        let query = HeadersQuery {
            orphan: Some(true),
            number_min: Some(10),
            limit: Some(5),
            ..Default::default()
        };
        let filter = query.filter();
        assert_eq!(filter.orphan, Some(true));
        assert_eq!(filter.number_min, Some(10));
        assert_eq!(filter.limit(), 5);
    }
}
