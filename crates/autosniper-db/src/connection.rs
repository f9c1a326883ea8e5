//! Database connection management.
//!
//! Opens a `SQLx` SQLite pool with WAL journaling and a busy timeout so that
//! concurrent scans can write through the same file.

use crate::error::{DatabaseError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default upper bound on pooled connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a connection pool for the database at `path`.
///
/// `:memory:` opens a private in-memory database shared by all pooled
/// connections.
///
/// # Errors
/// Returns `DatabaseError::Open` if the path is not valid UTF-8 or the
/// database cannot be opened.
pub async fn open_pool(path: impl AsRef<Path>, max_connections: u32) -> Result<Pool<Sqlite>> {
    let path_str = path.as_ref().to_str().ok_or_else(|| {
        DatabaseError::Open("invalid database path: not valid UTF-8".to_string())
    })?;

    let mut connect_options = SqliteConnectOptions::from_str(path_str)
        .map_err(|e| DatabaseError::Open(format!("invalid connection string: {e}")))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    if path_str != ":memory:" {
        connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(connect_options)
        .await
        .map_err(|e| DatabaseError::Open(format!("failed to open pool at {path_str}: {e}")))?;

    tracing::info!("Database pool created at {}", path_str);
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pool_creation() {
        let pool = open_pool(":memory:", DEFAULT_MAX_CONNECTIONS)
            .await
            .expect("open in-memory pool");

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .expect("run trivial query");
        pool.close().await;
    }

    #[tokio::test]
    async fn test_file_pool_creation() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("autosniper.db");

        let pool = open_pool(&path, 2).await.expect("open file pool");
        pool.close().await;

        assert!(path.exists());
    }
}
