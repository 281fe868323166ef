//! Repository pattern for database operations.
//!
//! Provides the upsert engine (header/transaction/link writes and sibling
//! demotion) and the read queries behind the HTTP API.

use std::collections::HashMap;

use sqlx::{
    sqlite::SqliteConnectOptions, ConnectOptions, Connection, QueryBuilder, Sqlite, SqlitePool,
};
use tracing::{debug, instrument};

use super::models::{HeaderFilter, HeaderRecord, MutableColumn, TransactionRecord};
use crate::error::TrackerError;

/// A transaction row together with the header that links to it.
#[derive(Debug, sqlx::FromRow)]
struct LinkedTransactionRow {
    link_hash: String,
    #[sqlx(flatten)]
    transaction: TransactionRecord,
}

/// A header row together with the transaction that links to it.
#[derive(Debug, sqlx::FromRow)]
struct LinkedHeaderRow {
    link_hash: String,
    #[sqlx(flatten)]
    header: HeaderRecord,
}

/// Repository for database operations.
///
/// Wraps a SQLite connection pool and provides type-safe methods
/// for all database interactions. Cheap to share behind an `Arc`.
///
/// Caller-supplied SQL never touches the pool. It runs on a fresh
/// connection opened read-only from `reader`.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    reader: SqliteConnectOptions,
}

impl Repository {
    /// Creates a new repository with the given connection pool.
    ///
    /// The pool must point at a database file; raw queries open it again
    /// read-only.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        let reader = super::read_only_options(&pool);
        Self { pool, reader }
    }

    // ==================== UPSERT OPERATIONS ====================

    /// Stores a header with its transactions in a single database transaction.
    ///
    /// - The header is inserted by hash. If the hash is already stored, only
    ///   `columns` (and `updated_at`) are rewritten; with no columns the
    ///   existing row is left untouched.
    /// - Each transaction row is fully overwritten, keeping `created_at`.
    /// - Header to transaction links are added idempotently.
    /// - When the header is canonical, every other header at the same height
    ///   is marked orphan.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use orphan_tracker::db::{create_pool, models::{HeaderRecord, MutableColumn}, Repository};
    ///
    /// # async fn run(header: HeaderRecord) -> Result<(), Box<dyn std::error::Error>> {
    /// let repo = Repository::new(create_pool("sqlite:./orphans.db").await?);
    /// repo.upsert_header(&header, &[], &[MutableColumn::Orphan]).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a database error if any statement fails; nothing is written in that case.
    #[instrument(
        skip(self, header, transactions),
        fields(hash = %header.hash, number = header.number, orphan = header.orphan, txes = transactions.len())
    )]
    pub async fn upsert_header(
        &self,
        header: &HeaderRecord,
        transactions: &[TransactionRecord],
        columns: &[MutableColumn],
    ) -> Result<(), TrackerError> {
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await.map_err(|e| {
            TrackerError::database("Failed to start transaction".to_string(), Some(Box::new(e)))
        })?;

        let sql = header_upsert_sql(columns);
        sqlx::query(&sql)
            .bind(&header.hash)
            .bind(&header.parent_hash)
            .bind(&header.uncle_hash)
            .bind(&header.miner)
            .bind(&header.state_root)
            .bind(&header.txes_root)
            .bind(&header.receipts_root)
            .bind(&header.logs_bloom)
            .bind(&header.difficulty)
            .bind(header.number)
            .bind(header.gas_limit)
            .bind(header.gas_used)
            .bind(header.timestamp)
            .bind(&header.extra_data)
            .bind(&header.mix_digest)
            .bind(&header.nonce)
            .bind(&header.base_fee)
            .bind(&header.withdrawals_root)
            .bind(&header.blob_gas_used)
            .bind(&header.excess_blob_gas)
            .bind(&header.parent_beacon_block_root)
            .bind(&header.requests_hash)
            .bind(&header.uncle1)
            .bind(&header.uncle2)
            .bind(header.orphan)
            .bind(&header.uncle_by)
            .bind(&header.error)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                TrackerError::database(
                    format!("Failed to upsert header {}", header.hash),
                    Some(Box::new(e)),
                )
            })?;

        for record in transactions {
            sqlx::query(
                r"
                INSERT INTO transactions (
                    hash, from_address, to_address, data, gas_price, gas_limit,
                    value, nonce, error, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (hash) DO UPDATE SET
                    from_address = excluded.from_address,
                    to_address = excluded.to_address,
                    data = excluded.data,
                    gas_price = excluded.gas_price,
                    gas_limit = excluded.gas_limit,
                    value = excluded.value,
                    nonce = excluded.nonce,
                    error = excluded.error,
                    updated_at = excluded.updated_at
                ",
            )
            .bind(&record.hash)
            .bind(&record.from_address)
            .bind(&record.to_address)
            .bind(&record.data)
            .bind(&record.gas_price)
            .bind(&record.gas_limit)
            .bind(&record.value)
            .bind(record.nonce)
            .bind(&record.error)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                TrackerError::database(
                    format!("Failed to upsert transaction {}", record.hash),
                    Some(Box::new(e)),
                )
            })?;

            sqlx::query(
                "INSERT INTO header_transactions (header_hash, tx_hash) VALUES (?, ?) ON CONFLICT DO NOTHING",
            )
            .bind(&header.hash)
            .bind(&record.hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                TrackerError::database(
                    format!("Failed to link transaction {}", record.hash),
                    Some(Box::new(e)),
                )
            })?;
        }

        if !header.orphan {
            let demoted = demote_query(header.number, &header.hash, now)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    TrackerError::database(
                        format!("Failed to demote siblings at {}", header.number),
                        Some(Box::new(e)),
                    )
                })?
                .rows_affected();
            if demoted > 0 {
                debug!(demoted, "Demoted sibling headers");
            }
        }

        tx.commit().await.map_err(|e| {
            TrackerError::database(
                "Failed to commit transaction".to_string(),
                Some(Box::new(e)),
            )
        })?;

        Ok(())
    }

    /// Marks every stored header at `number` other than `hash` as orphan.
    ///
    /// Returns the number of rows that changed.
    ///
    /// # Errors
    ///
    /// Returns a database error if the update fails.
    #[instrument(skip(self))]
    pub async fn demote_siblings(&self, number: i64, hash: &str) -> Result<u64, TrackerError> {
        let now = chrono::Utc::now().timestamp();

        let result = demote_query(number, hash, now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                TrackerError::database(
                    format!("Failed to demote siblings at {number}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(result.rows_affected())
    }

    /// Counts stored non-orphan headers at a height.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn count_canonical_at(&self, number: i64) -> Result<i64, TrackerError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM headers WHERE number = ? AND orphan = 0")
                .bind(number)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    TrackerError::database(
                        format!("Failed to count canonical headers at {number}"),
                        Some(Box::new(e)),
                    )
                })?;

        Ok(count)
    }

    // ==================== QUERY OPERATIONS ====================

    /// Health check for database connectivity.
    ///
    /// # Errors
    ///
    /// Returns a database error if the database is unreachable.
    pub async fn health_check(&self) -> Result<(), TrackerError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                TrackerError::database(
                    "Database health check failed".to_string(),
                    Some(Box::new(e)),
                )
            })?;

        Ok(())
    }

    /// Fetches a header by hash.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn get_header(&self, hash: &str) -> Result<Option<HeaderRecord>, TrackerError> {
        sqlx::query_as::<_, HeaderRecord>("SELECT * FROM headers WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                TrackerError::database(
                    format!("Failed to query header {hash}"),
                    Some(Box::new(e)),
                )
            })
    }

    /// Highest stored canonical header.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn latest_canonical_header(&self) -> Result<Option<HeaderRecord>, TrackerError> {
        sqlx::query_as::<_, HeaderRecord>(
            "SELECT * FROM headers WHERE orphan = 0 ORDER BY number DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            TrackerError::database(
                "Failed to query latest canonical header".to_string(),
                Some(Box::new(e)),
            )
        })
    }

    /// Total stored headers and how many of them are orphans.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn header_counts(&self) -> Result<(i64, i64), TrackerError> {
        sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN orphan THEN 1 ELSE 0 END), 0) FROM headers",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            TrackerError::database("Failed to count headers".to_string(), Some(Box::new(e)))
        })
    }

    /// Lists headers matching a filter, newest first, orphans before
    /// canonical blocks at the same height.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    #[instrument(skip(self))]
    pub async fn list_headers(
        &self,
        filter: &HeaderFilter,
    ) -> Result<Vec<HeaderRecord>, TrackerError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM headers WHERE 1 = 1");

        if let Some(orphan) = filter.orphan {
            query.push(" AND orphan = ").push_bind(orphan);
        }
        if let Some(min) = filter.number_min {
            query.push(" AND number >= ").push_bind(min);
        }
        if let Some(max) = filter.number_max {
            query.push(" AND number <= ").push_bind(max);
        }
        if let Some(min) = filter.timestamp_min {
            query.push(" AND timestamp >= ").push_bind(min);
        }
        if let Some(max) = filter.timestamp_max {
            query.push(" AND timestamp <= ").push_bind(max);
        }

        query
            .push(" ORDER BY number DESC, orphan DESC, hash ASC LIMIT ")
            .push_bind(filter.limit())
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0).max(0));

        query
            .build_query_as::<HeaderRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                TrackerError::database("Failed to list headers".to_string(), Some(Box::new(e)))
            })
    }

    /// Lists transactions, most recently stored first.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn list_transactions(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TransactionRecord>, TrackerError> {
        sqlx::query_as::<_, TransactionRecord>(
            "SELECT * FROM transactions ORDER BY created_at DESC, hash ASC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            TrackerError::database("Failed to list transactions".to_string(), Some(Box::new(e)))
        })
    }

    /// Transactions linked to each of the given headers, keyed by header hash.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn transactions_for_headers(
        &self,
        header_hashes: &[String],
    ) -> Result<HashMap<String, Vec<TransactionRecord>>, TrackerError> {
        let mut grouped: HashMap<String, Vec<TransactionRecord>> = HashMap::new();
        if header_hashes.is_empty() {
            return Ok(grouped);
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT ht.header_hash AS link_hash, t.* FROM header_transactions ht \
             JOIN transactions t ON t.hash = ht.tx_hash WHERE ht.header_hash IN (",
        );
        let mut separated = query.separated(", ");
        for hash in header_hashes {
            separated.push_bind(hash.as_str());
        }
        separated.push_unseparated(") ORDER BY t.nonce ASC, t.hash ASC");

        let rows = query
            .build_query_as::<LinkedTransactionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                TrackerError::database(
                    "Failed to load header transactions".to_string(),
                    Some(Box::new(e)),
                )
            })?;

        for row in rows {
            grouped.entry(row.link_hash).or_default().push(row.transaction);
        }

        Ok(grouped)
    }

    /// Headers that include each of the given transactions, keyed by transaction hash.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn headers_for_transactions(
        &self,
        tx_hashes: &[String],
    ) -> Result<HashMap<String, Vec<HeaderRecord>>, TrackerError> {
        let mut grouped: HashMap<String, Vec<HeaderRecord>> = HashMap::new();
        if tx_hashes.is_empty() {
            return Ok(grouped);
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT ht.tx_hash AS link_hash, h.* FROM header_transactions ht \
             JOIN headers h ON h.hash = ht.header_hash WHERE ht.tx_hash IN (",
        );
        let mut separated = query.separated(", ");
        for hash in tx_hashes {
            separated.push_bind(hash.as_str());
        }
        separated.push_unseparated(") ORDER BY h.number DESC, h.orphan DESC");

        let rows = query
            .build_query_as::<LinkedHeaderRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                TrackerError::database(
                    "Failed to load transaction headers".to_string(),
                    Some(Box::new(e)),
                )
            })?;

        for row in rows {
            grouped.entry(row.link_hash).or_default().push(row.header);
        }

        Ok(grouped)
    }

    /// Runs a caller-supplied query against `headers` without side effects.
    ///
    /// The query runs on a read-only connection, inside a transaction with
    /// `PRAGMA query_only` set, and the transaction is always rolled back.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails or does not return header rows.
    pub async fn raw_headers(&self, sql: &str) -> Result<Vec<HeaderRecord>, TrackerError> {
        self.read_only(sql).await
    }

    /// Runs a caller-supplied query against `transactions` without side effects.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails or does not return transaction rows.
    pub async fn raw_transactions(
        &self,
        sql: &str,
    ) -> Result<Vec<TransactionRecord>, TrackerError> {
        self.read_only(sql).await
    }

    async fn read_only<T>(&self, sql: &str) -> Result<Vec<T>, TrackerError>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin,
    {
        let mut conn = self.reader.connect().await.map_err(|e| {
            TrackerError::database("Failed to open read-only connection".to_string(), Some(Box::new(e)))
        })?;

        let mut tx = conn.begin().await.map_err(|e| {
            TrackerError::database("Failed to start transaction".to_string(), Some(Box::new(e)))
        })?;

        sqlx::query("PRAGMA query_only = ON")
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                TrackerError::database("Failed to enter read-only mode".to_string(), Some(Box::new(e)))
            })?;

        let rows = sqlx::query_as::<_, T>(sql).fetch_all(&mut *tx).await;
        let rolled_back = tx.rollback().await;
        if let Err(e) = conn.close().await {
            debug!(error = %e, "Read-only connection did not close cleanly");
        }

        let rows = rows.map_err(|e| {
            TrackerError::database("Raw query failed".to_string(), Some(Box::new(e)))
        })?;

        rolled_back.map_err(|e| {
            TrackerError::database("Failed to roll back transaction".to_string(), Some(Box::new(e)))
        })?;

        Ok(rows)
    }
}

fn header_upsert_sql(columns: &[MutableColumn]) -> String {
    let conflict = if columns.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let mut assignments: Vec<String> = Vec::with_capacity(columns.len() + 1);
        for column in columns {
            let assignment = format!("{0} = excluded.{0}", column.column());
            if !assignments.contains(&assignment) {
                assignments.push(assignment);
            }
        }
        assignments.push("updated_at = excluded.updated_at".to_string());
        format!("DO UPDATE SET {}", assignments.join(", "))
    };

    format!(
        r"
        INSERT INTO headers (
            hash, parent_hash, uncle_hash, miner, state_root, txes_root, receipts_root,
            logs_bloom, difficulty, number, gas_limit, gas_used, timestamp, extra_data,
            mix_digest, nonce, base_fee, withdrawals_root, blob_gas_used, excess_blob_gas,
            parent_beacon_block_root, requests_hash, uncle1, uncle2, orphan, uncle_by,
            error, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (hash) {conflict}
        "
    )
}

fn demote_query(
    number: i64,
    hash: &str,
    now: i64,
) -> sqlx::query::Query<'_, Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(
        "UPDATE headers SET orphan = 1, updated_at = ? WHERE number = ? AND hash != ? AND orphan = 0",
    )
    .bind(now)
    .bind(number)
    .bind(hash)
}
