//! Database module for persistent storage of block headers and transactions.
//!
//! This module provides SQLite-based storage for:
//! - Canonical and non-canonical block headers (`headers`)
//! - Transactions, one row per hash (`transactions`)
//! - Header to transaction links (`header_transactions`)
//!
//! # Architecture
//!
//! - `models`: Data structures that map to database tables
//! - `repository`: Upserts, sibling demotion and read queries
//! - Connection pooling with SQLite WAL mode so the API can read while the
//!   tracker writes
//! - Embedded migrations from `migrations/`

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::TrackerError;

pub mod models;
pub mod repository;

pub use repository::Repository;

const REQUIRED_TABLES: [&str; 3] = ["headers", "transactions", "header_transactions"];

/// Creates a SQLite connection pool and applies migrations.
///
/// # Configuration
///
/// - **WAL mode**: Concurrent readers during writes
/// - **Busy timeout**: 30 seconds to handle lock contention
/// - **Max connections**: 5
/// - **Foreign keys**: enforced on every connection
///
/// # Example
///
/// ```no_run
/// use orphan_tracker::db::create_pool;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = create_pool("sqlite:./orphans.db").await?;
///     Ok(())
/// }
/// ```
///
/// # Errors
///
/// Returns a database error if the URL is invalid, the connection fails or a
/// migration cannot be applied.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, TrackerError> {
    info!(database_url, "Connecting to database");

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| {
            TrackerError::database(
                format!("Failed to parse database URL: {database_url}"),
                Some(Box::new(e)),
            )
        })?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(|e| {
            TrackerError::database(
                format!("Failed to connect to database at {database_url}"),
                Some(Box::new(e)),
            )
        })?;

    info!("Running database migrations");
    run_migrations(&pool).await?;
    verify_database(&pool).await?;
    info!("Database migrations complete");

    Ok(pool)
}

/// Connect options for opening the pool's database file read-only.
///
/// The flag is set when SQLite opens the file, so no statement sent over
/// such a connection can write, not even after `PRAGMA query_only = OFF`.
#[must_use]
pub fn read_only_options(pool: &SqlitePool) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(pool.connect_options().get_filename())
        .read_only(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(30))
}

/// Applies all pending migrations from the `migrations/` directory.
///
/// # Errors
///
/// Returns a database error if a migration fails.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), TrackerError> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        TrackerError::database(
            "Failed to run database migrations".to_string(),
            Some(Box::new(e)),
        )
    })?;

    Ok(())
}

/// Verify that required tables exist after migrations.
///
/// # Errors
///
/// Returns a database error if any table is missing.
pub async fn verify_database(pool: &SqlitePool) -> Result<(), TrackerError> {
    let rows = sqlx::query_as::<_, (String,)>(
        r"
        SELECT name FROM sqlite_master
        WHERE type='table' AND name IN ('headers', 'transactions', 'header_transactions')
        ",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| {
        TrackerError::database(
            "Failed to verify database schema".to_string(),
            Some(Box::new(e)),
        )
    })?;

    if rows.len() < REQUIRED_TABLES.len() {
        let found: Vec<_> = rows.into_iter().map(|(name,)| name).collect();
        return Err(TrackerError::database(
            format!(
                "Database schema incomplete. Expected {:?}, found {found:?}",
                REQUIRED_TABLES
            ),
            None,
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::ConnectOptions;
    use tempfile::TempDir;

    async fn temp_pool() -> (TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("test.db").display());
        let pool = create_pool(&url).await.expect("Failed to create pool");
        (dir, pool)
    }

    #[tokio::test]
    async fn test_create_pool_and_migrations() {
        let (_dir, pool) = temp_pool().await;

        // Idempotent
        run_migrations(&pool).await.expect("Failed to rerun migrations");
        verify_database(&pool).await.expect("Schema incomplete");
    }

    #[tokio::test]
    async fn test_wal_mode_enabled() {
        let (_dir, pool) = temp_pool().await;

        let result: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .expect("Failed to query journal mode");

        assert_eq!(result.0, "wal");
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let (_dir, pool) = temp_pool().await;

        let result: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("Failed to query foreign keys");

        assert_eq!(result.0, 1, "Foreign keys should be enabled");
    }

    #[tokio::test]
    async fn test_read_only_connection_rejects_writes() {
        let (_dir, pool) = temp_pool().await;
        let mut conn = read_only_options(&pool).connect().await.unwrap();

        let tables: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM headers")
            .fetch_one(&mut conn)
            .await
            .expect("Reader should see the schema");
        assert_eq!(tables.0, 0);

        sqlx::query("PRAGMA query_only = OFF")
            .execute(&mut conn)
            .await
            .unwrap();
        let write = sqlx::query("DELETE FROM headers").execute(&mut conn).await;
        assert!(write.is_err(), "Read-only connection accepted a write");
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let result = create_pool("postgres://nope").await;
        assert!(matches!(result, Err(TrackerError::DatabaseError { .. })));
    }
}
