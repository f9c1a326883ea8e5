//! AutoSniper Database Layer
//!
//! Provides `SQLite` storage for harvested listings, saved searches, tracked
//! favorites and per-owner messaging channels. Uses `SQLx` with embedded
//! migrations.
//!
//! # Example
//!
//! ```ignore
//! use autosniper_db::Database;
//!
//! let db = Database::new("autosniper.db").await?;
//! db.run_migrations().await?;
//! ```
//!
//! # Design Principles
//!
//! - Listing identity is the `UNIQUE` `source_url` column; the persistence gate
//!   in [`listings`] relies on it rather than on any lock
//! - Timestamps are stored as fixed-width RFC 3339 UTC text so that string
//!   comparison orders them correctly
//! - Structured fields (images, damage report, criteria, price history) are
//!   JSON text

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod channels;
pub mod connection;
pub mod error;
pub mod favorites;
pub mod filters;
pub mod listings;
pub mod migrations;

// Re-export commonly used types
pub use channels::NotificationChannel;
pub use error::{DatabaseError, Result};
pub use favorites::{Favorite, PricePoint, TrackedListing};
pub use filters::{RecurringSchedule, SavedFilter};
pub use listings::RetentionOutcome;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Pool, Sqlite};
use std::path::Path;

/// High-level database handle.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open the database at `path` (or `:memory:`) with the default pool size.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_max_connections(path, connection::DEFAULT_MAX_CONNECTIONS).await
    }

    /// Open the database at `path` with an explicit pool size.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn with_max_connections(
        path: impl AsRef<Path>,
        max_connections: u32,
    ) -> Result<Self> {
        let pool = connection::open_pool(path, max_connections).await?;
        Ok(Self { pool })
    }

    /// Run all pending database migrations.
    ///
    /// # Errors
    /// Returns `DatabaseError::Migration` if any migration fails.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Get the current schema version.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the version cannot be queried.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(&self.pool).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the database connection gracefully.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }
}

/// Fixed-width UTC RFC 3339 (nanosecond precision, `Z` suffix).
pub(crate) fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode(format!("invalid timestamp '{s}': {e}")))
}
