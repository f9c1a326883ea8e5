//! Saved searches and their recurring-scan state.
//!
//! The schema enforces that a filter with recurring scan disabled has no
//! next-due time. Every update here keeps that invariant in the same
//! statement that changes the enabled flag.

use crate::error::{DatabaseError, Result};
use crate::{decode_timestamp, encode_timestamp};
use autosniper_core::{FilterId, SearchCriteria, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

const FILTER_COLUMNS: &str = "id, user_id, name, criteria, is_active, auto_scan_enabled, \
     scan_interval_minutes, last_scan_at, next_scan_at, total_scans, new_listings_found, created_at";

/// Recurring-scan fields of a filter, exposed read-only to collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringSchedule {
    /// Whether recurring scan is on
    pub enabled: bool,
    /// Minutes between runs
    pub interval_minutes: i64,
    /// Completion time of the latest run
    pub last_run_at: Option<DateTime<Utc>>,
    /// When the next run is due; always `None` while disabled
    pub next_due_at: Option<DateTime<Utc>>,
    /// Successful runs so far
    pub run_count: i64,
    /// Listings newly stored by successful runs
    pub new_listings_found: i64,
}

/// A user-owned saved search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedFilter {
    /// Unique identifier
    pub id: FilterId,
    /// Owner
    pub user_id: UserId,
    /// Display name used in notifications
    pub name: String,
    /// Match criteria
    pub criteria: SearchCriteria,
    /// Inactive filters are neither matched nor scheduled
    pub is_active: bool,
    /// Recurring-scan state
    pub schedule: RecurringSchedule,
    /// When the filter was created
    pub created_at: DateTime<Utc>,
}

/// Create a filter with recurring scan disabled.
///
/// # Errors
/// Returns `DatabaseError` if the insert fails.
pub async fn create_filter(
    pool: &Pool<Sqlite>,
    user_id: &UserId,
    name: &str,
    criteria: &SearchCriteria,
) -> Result<SavedFilter> {
    let id = FilterId::generate();
    let created_at = Utc::now();
    let interval_minutes = 60;

    sqlx::query(
        "INSERT INTO filters (id, user_id, name, criteria, is_active, auto_scan_enabled,
             scan_interval_minutes, created_at)
         VALUES (?, ?, ?, ?, 1, 0, ?, ?)",
    )
    .bind(id.as_str())
    .bind(user_id.as_str())
    .bind(name)
    .bind(serde_json::to_string(criteria)?)
    .bind(interval_minutes)
    .bind(encode_timestamp(created_at))
    .execute(pool)
    .await?;

    Ok(SavedFilter {
        id,
        user_id: user_id.clone(),
        name: name.to_string(),
        criteria: criteria.clone(),
        is_active: true,
        schedule: RecurringSchedule {
            enabled: false,
            interval_minutes,
            last_run_at: None,
            next_due_at: None,
            run_count: 0,
            new_listings_found: 0,
        },
        created_at,
    })
}

/// Get a filter by id.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a column cannot be decoded.
pub async fn get_filter(pool: &Pool<Sqlite>, id: &FilterId) -> Result<Option<SavedFilter>> {
    let row = sqlx::query(&format!("SELECT {FILTER_COLUMNS} FROM filters WHERE id = ?"))
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?;

    row.map(|r| parse_filter_row(&r)).transpose()
}

/// All active filters, for matching new listings.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a column cannot be decoded.
pub async fn list_active_filters(pool: &Pool<Sqlite>) -> Result<Vec<SavedFilter>> {
    let rows = sqlx::query(&format!(
        "SELECT {FILTER_COLUMNS} FROM filters WHERE is_active = 1 ORDER BY created_at"
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(parse_filter_row).collect()
}

/// All filters owned by `user_id`.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a column cannot be decoded.
pub async fn list_filters_for_user(
    pool: &Pool<Sqlite>,
    user_id: &UserId,
) -> Result<Vec<SavedFilter>> {
    let rows = sqlx::query(&format!(
        "SELECT {FILTER_COLUMNS} FROM filters WHERE user_id = ? ORDER BY created_at"
    ))
    .bind(user_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(parse_filter_row).collect()
}

/// Active filters with recurring scan enabled whose next run is due at `now`.
///
/// An enabled filter without a next-due time counts as due.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a column cannot be decoded.
pub async fn list_due_filters(pool: &Pool<Sqlite>, now: DateTime<Utc>) -> Result<Vec<SavedFilter>> {
    let rows = sqlx::query(&format!(
        "SELECT {FILTER_COLUMNS} FROM filters
         WHERE auto_scan_enabled = 1 AND is_active = 1
           AND (next_scan_at IS NULL OR next_scan_at <= ?)
         ORDER BY next_scan_at"
    ))
    .bind(encode_timestamp(now))
    .fetch_all(pool)
    .await?;

    rows.iter().map(parse_filter_row).collect()
}

/// Turn recurring scan on with the given interval; next run is due at
/// `now + interval`.
///
/// # Errors
/// Returns `DatabaseError::NotFoundWithMessage` if the filter does not exist.
pub async fn enable_recurring(
    pool: &Pool<Sqlite>,
    id: &FilterId,
    interval_minutes: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    let next_due = now + Duration::minutes(interval_minutes);
    let result = sqlx::query(
        "UPDATE filters
         SET auto_scan_enabled = 1, scan_interval_minutes = ?, next_scan_at = ?
         WHERE id = ?",
    )
    .bind(interval_minutes)
    .bind(encode_timestamp(next_due))
    .bind(id.as_str())
    .execute(pool)
    .await?;

    ensure_updated(result.rows_affected(), id)
}

/// Turn recurring scan off and clear the next-due time.
///
/// # Errors
/// Returns `DatabaseError::NotFoundWithMessage` if the filter does not exist.
pub async fn disable_recurring(pool: &Pool<Sqlite>, id: &FilterId) -> Result<()> {
    let result = sqlx::query(
        "UPDATE filters SET auto_scan_enabled = 0, next_scan_at = NULL WHERE id = ?",
    )
    .bind(id.as_str())
    .execute(pool)
    .await?;

    ensure_updated(result.rows_affected(), id)
}

/// Record a finished run.
///
/// The next-due time always moves to `completed_at + interval` (or stays
/// unset if recurring scan was turned off meanwhile). Counters and the
/// last-run time only change when `new_listings` is `Some`, i.e. the run
/// succeeded.
///
/// # Errors
/// Returns `DatabaseError::NotFoundWithMessage` if the filter does not exist.
pub async fn record_run(
    pool: &Pool<Sqlite>,
    id: &FilterId,
    completed_at: DateTime<Utc>,
    new_listings: Option<i64>,
) -> Result<()> {
    let interval: Option<i64> =
        sqlx::query_scalar("SELECT scan_interval_minutes FROM filters WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(pool)
            .await?;
    let Some(interval) = interval else {
        return Err(not_found(id));
    };
    let next_due = encode_timestamp(completed_at + Duration::minutes(interval));

    let result = match new_listings {
        Some(found) => {
            sqlx::query(
                "UPDATE filters
                 SET last_scan_at = ?,
                     next_scan_at = CASE WHEN auto_scan_enabled = 1 THEN ? ELSE NULL END,
                     total_scans = total_scans + 1,
                     new_listings_found = new_listings_found + ?
                 WHERE id = ?",
            )
            .bind(encode_timestamp(completed_at))
            .bind(next_due)
            .bind(found)
            .bind(id.as_str())
            .execute(pool)
            .await?
        }
        None => {
            sqlx::query(
                "UPDATE filters
                 SET next_scan_at = CASE WHEN auto_scan_enabled = 1 THEN ? ELSE NULL END
                 WHERE id = ?",
            )
            .bind(next_due)
            .bind(id.as_str())
            .execute(pool)
            .await?
        }
    };

    ensure_updated(result.rows_affected(), id)
}

/// Activate or deactivate a filter.
///
/// # Errors
/// Returns `DatabaseError::NotFoundWithMessage` if the filter does not exist.
pub async fn set_active(pool: &Pool<Sqlite>, id: &FilterId, active: bool) -> Result<()> {
    let result = sqlx::query("UPDATE filters SET is_active = ? WHERE id = ?")
        .bind(active)
        .bind(id.as_str())
        .execute(pool)
        .await?;

    ensure_updated(result.rows_affected(), id)
}

/// Delete a filter.
///
/// # Errors
/// Returns `DatabaseError` if the delete fails.
pub async fn delete_filter(pool: &Pool<Sqlite>, id: &FilterId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM filters WHERE id = ?")
        .bind(id.as_str())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn not_found(id: &FilterId) -> DatabaseError {
    DatabaseError::NotFoundWithMessage(format!("Filter '{id}' not found"))
}

fn ensure_updated(rows_affected: u64, id: &FilterId) -> Result<()> {
    if rows_affected == 0 {
        Err(not_found(id))
    } else {
        Ok(())
    }
}

fn parse_optional_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    row.try_get::<Option<String>, _>(column)?
        .map(|s| decode_timestamp(&s))
        .transpose()
}

fn parse_filter_row(row: &SqliteRow) -> Result<SavedFilter> {
    let id: String = row.try_get("id")?;
    let user_id: String = row.try_get("user_id")?;
    let criteria_json: String = row.try_get("criteria")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(SavedFilter {
        id: FilterId::new(id).map_err(|e| DatabaseError::Decode(e.to_string()))?,
        user_id: UserId::new(user_id).map_err(|e| DatabaseError::Decode(e.to_string()))?,
        name: row.try_get("name")?,
        criteria: serde_json::from_str(&criteria_json)?,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        schedule: RecurringSchedule {
            enabled: row.try_get::<i64, _>("auto_scan_enabled")? != 0,
            interval_minutes: row.try_get("scan_interval_minutes")?,
            last_run_at: parse_optional_timestamp(row, "last_scan_at")?,
            next_due_at: parse_optional_timestamp(row, "next_scan_at")?,
            run_count: row.try_get("total_scans")?,
            new_listings_found: row.try_get("new_listings_found")?,
        },
        created_at: decode_timestamp(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn setup_test_db() -> Database {
        let db = Database::new(":memory:").await.expect("create test database");
        db.run_migrations().await.expect("run migrations");
        db
    }

    fn audi_criteria() -> SearchCriteria {
        SearchCriteria {
            brand: Some("Audi".to_string()),
            max_price: Some(900_000.0),
            ..SearchCriteria::default()
        }
    }

    async fn create_test_filter(db: &Database) -> SavedFilter {
        let user = UserId::new("7").expect("valid user id");
        create_filter(db.pool(), &user, "Audi under 900k", &audi_criteria())
            .await
            .expect("create filter")
    }

    #[tokio::test]
    async fn test_create_and_get_filter() {
        let db = setup_test_db().await;
        let created = create_test_filter(&db).await;

        let fetched = get_filter(db.pool(), &created.id)
            .await
            .expect("get filter")
            .expect("filter exists");

        assert_eq!(fetched.name, "Audi under 900k");
        assert_eq!(fetched.criteria, audi_criteria());
        assert!(fetched.is_active);
        assert!(!fetched.schedule.enabled);
        assert!(fetched.schedule.next_due_at.is_none());
    }

    #[tokio::test]
    async fn test_enable_sets_next_due() {
        let db = setup_test_db().await;
        let filter = create_test_filter(&db).await;
        let now = Utc::now();

        enable_recurring(db.pool(), &filter.id, 30, now)
            .await
            .expect("enable");

        let fetched = get_filter(db.pool(), &filter.id)
            .await
            .expect("get")
            .expect("exists");
        assert!(fetched.schedule.enabled);
        assert_eq!(fetched.schedule.interval_minutes, 30);
        let next = fetched.schedule.next_due_at.expect("next due set");
        assert_eq!((next - now).num_minutes(), 30);
    }

    #[tokio::test]
    async fn test_disable_clears_next_due() {
        let db = setup_test_db().await;
        let filter = create_test_filter(&db).await;
        enable_recurring(db.pool(), &filter.id, 30, Utc::now())
            .await
            .expect("enable");

        disable_recurring(db.pool(), &filter.id)
            .await
            .expect("disable");

        let fetched = get_filter(db.pool(), &filter.id)
            .await
            .expect("get")
            .expect("exists");
        assert!(!fetched.schedule.enabled);
        assert!(fetched.schedule.next_due_at.is_none());
    }

    #[tokio::test]
    async fn test_schema_rejects_next_due_while_disabled() {
        let db = setup_test_db().await;
        let filter = create_test_filter(&db).await;

        let result = sqlx::query("UPDATE filters SET next_scan_at = ? WHERE id = ?")
            .bind(encode_timestamp(Utc::now()))
            .bind(filter.id.as_str())
            .execute(db.pool())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_list_due_filters() {
        let db = setup_test_db().await;
        let due = create_test_filter(&db).await;
        let later = create_test_filter(&db).await;
        let disabled = create_test_filter(&db).await;
        let inactive = create_test_filter(&db).await;

        let now = Utc::now();
        enable_recurring(db.pool(), &due.id, 30, now - Duration::hours(1))
            .await
            .expect("enable due");
        enable_recurring(db.pool(), &later.id, 30, now)
            .await
            .expect("enable later");
        enable_recurring(db.pool(), &inactive.id, 30, now - Duration::hours(1))
            .await
            .expect("enable inactive");
        set_active(db.pool(), &inactive.id, false)
            .await
            .expect("deactivate");

        let listed = list_due_filters(db.pool(), now).await.expect("list due");
        let ids: Vec<_> = listed.iter().map(|f| f.id.clone()).collect();

        assert_eq!(ids, vec![due.id]);
        assert!(!ids.contains(&disabled.id));
    }

    #[tokio::test]
    async fn test_enabled_without_next_due_counts_as_due() {
        let db = setup_test_db().await;
        let filter = create_test_filter(&db).await;

        sqlx::query("UPDATE filters SET auto_scan_enabled = 1 WHERE id = ?")
            .bind(filter.id.as_str())
            .execute(db.pool())
            .await
            .expect("enable without next due");

        let listed = list_due_filters(db.pool(), Utc::now())
            .await
            .expect("list due");
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_record_run_success_advances_and_counts() {
        let db = setup_test_db().await;
        let filter = create_test_filter(&db).await;
        let start = Utc::now();
        enable_recurring(db.pool(), &filter.id, 30, start)
            .await
            .expect("enable");

        let completed = start + Duration::minutes(2);
        record_run(db.pool(), &filter.id, completed, Some(4))
            .await
            .expect("record run");

        let fetched = get_filter(db.pool(), &filter.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(
            fetched.schedule.next_due_at,
            Some(completed + Duration::minutes(30))
        );
        assert_eq!(fetched.schedule.last_run_at, Some(completed));
        assert_eq!(fetched.schedule.run_count, 1);
        assert_eq!(fetched.schedule.new_listings_found, 4);
    }

    #[tokio::test]
    async fn test_record_run_failure_only_advances() {
        let db = setup_test_db().await;
        let filter = create_test_filter(&db).await;
        let start = Utc::now();
        enable_recurring(db.pool(), &filter.id, 30, start)
            .await
            .expect("enable");

        let completed = start + Duration::minutes(1);
        record_run(db.pool(), &filter.id, completed, None)
            .await
            .expect("record failed run");

        let fetched = get_filter(db.pool(), &filter.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(
            fetched.schedule.next_due_at,
            Some(completed + Duration::minutes(30))
        );
        assert!(fetched.schedule.last_run_at.is_none());
        assert_eq!(fetched.schedule.run_count, 0);
    }

    #[tokio::test]
    async fn test_record_run_after_disable_keeps_next_due_unset() {
        let db = setup_test_db().await;
        let filter = create_test_filter(&db).await;
        enable_recurring(db.pool(), &filter.id, 30, Utc::now())
            .await
            .expect("enable");
        disable_recurring(db.pool(), &filter.id)
            .await
            .expect("disable mid-run");

        record_run(db.pool(), &filter.id, Utc::now(), Some(1))
            .await
            .expect("record run");

        let fetched = get_filter(db.pool(), &filter.id)
            .await
            .expect("get")
            .expect("exists");
        assert!(fetched.schedule.next_due_at.is_none());
        assert_eq!(fetched.schedule.run_count, 1);
    }

    #[tokio::test]
    async fn test_missing_filter_errors() {
        let db = setup_test_db().await;
        let id = FilterId::new("missing").expect("valid id");

        assert!(matches!(
            enable_recurring(db.pool(), &id, 30, Utc::now()).await,
            Err(DatabaseError::NotFoundWithMessage(_))
        ));
        assert!(matches!(
            record_run(db.pool(), &id, Utc::now(), None).await,
            Err(DatabaseError::NotFoundWithMessage(_))
        ));
        assert!(!delete_filter(db.pool(), &id).await.expect("delete"));
    }
}
