//! Tracked listings with an append-only price history.

use crate::error::{DatabaseError, Result};
use crate::{decode_timestamp, encode_timestamp};
use autosniper_core::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

/// One observed price change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Price observed at `date`
    pub price: f64,
    /// Price before the change
    pub old_price: f64,
    /// When the change was observed
    pub date: DateTime<Utc>,
}

/// A user tracking a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    /// Row id
    pub id: i64,
    /// Owner
    pub user_id: UserId,
    /// Tracked listing
    pub listing_id: i64,
    /// Price when tracking started
    pub price_at_favorite: f64,
    /// Changes observed since, oldest first
    pub price_history: Vec<PricePoint>,
    /// Latest re-check that found a change
    pub last_checked_at: Option<DateTime<Utc>>,
    /// When tracking started
    pub created_at: DateTime<Utc>,
}

/// A favorite joined with the listing fields price re-checking needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedListing {
    /// The favorite itself
    pub favorite: Favorite,
    /// Listing identity key
    pub source_url: String,
    /// Listing title
    pub title: String,
    /// Current stored price
    pub current_price: f64,
}

/// Start tracking `listing_id` for `user_id`.
///
/// # Errors
/// Returns `DatabaseError` if the listing does not exist or the user already
/// tracks it.
pub async fn create_favorite(
    pool: &Pool<Sqlite>,
    user_id: &UserId,
    listing_id: i64,
    price: f64,
) -> Result<Favorite> {
    let created_at = Utc::now();
    let result = sqlx::query(
        "INSERT INTO favorites (user_id, listing_id, price_at_favorite, price_history, created_at)
         VALUES (?, ?, ?, '[]', ?)",
    )
    .bind(user_id.as_str())
    .bind(listing_id)
    .bind(price)
    .bind(encode_timestamp(created_at))
    .execute(pool)
    .await?;

    Ok(Favorite {
        id: result.last_insert_rowid(),
        user_id: user_id.clone(),
        listing_id,
        price_at_favorite: price,
        price_history: Vec::new(),
        last_checked_at: None,
        created_at,
    })
}

/// Get a favorite by id.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a column cannot be decoded.
pub async fn get_favorite(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Favorite>> {
    let row = sqlx::query(
        "SELECT id, user_id, listing_id, price_at_favorite, price_history, last_checked_at,
                created_at
         FROM favorites WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| parse_favorite_row(&r)).transpose()
}

/// Every favorite with its listing's URL, title and stored price.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a column cannot be decoded.
pub async fn list_tracked_listings(pool: &Pool<Sqlite>) -> Result<Vec<TrackedListing>> {
    let rows = sqlx::query(
        "SELECT f.id, f.user_id, f.listing_id, f.price_at_favorite, f.price_history,
                f.last_checked_at, f.created_at,
                l.source_url, l.title, l.price AS current_price
         FROM favorites f
         JOIN listings l ON l.id = f.listing_id
         ORDER BY f.id",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(TrackedListing {
                favorite: parse_favorite_row(row)?,
                source_url: row.try_get("source_url")?,
                title: row.try_get("title")?,
                current_price: row.try_get("current_price")?,
            })
        })
        .collect()
}

/// Append a price change to a favorite's history and stamp the check time.
///
/// # Errors
/// Returns `DatabaseError::NotFoundWithMessage` if the favorite does not exist.
pub async fn record_price_change(
    pool: &Pool<Sqlite>,
    favorite_id: i64,
    point: &PricePoint,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let history: Option<String> =
        sqlx::query_scalar("SELECT price_history FROM favorites WHERE id = ?")
            .bind(favorite_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(history) = history else {
        return Err(DatabaseError::NotFoundWithMessage(format!(
            "Favorite '{favorite_id}' not found"
        )));
    };

    let mut history: Vec<PricePoint> = serde_json::from_str(&history)?;
    history.push(point.clone());

    sqlx::query("UPDATE favorites SET price_history = ?, last_checked_at = ? WHERE id = ?")
        .bind(serde_json::to_string(&history)?)
        .bind(encode_timestamp(point.date))
        .bind(favorite_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Stop tracking. Returns whether a favorite was removed.
///
/// # Errors
/// Returns `DatabaseError` if the delete fails.
pub async fn delete_favorite(pool: &Pool<Sqlite>, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM favorites WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn parse_favorite_row(row: &SqliteRow) -> Result<Favorite> {
    let user_id: String = row.try_get("user_id")?;
    let history: String = row.try_get("price_history")?;
    let created_at: String = row.try_get("created_at")?;
    let last_checked_at = row
        .try_get::<Option<String>, _>("last_checked_at")?
        .map(|s| decode_timestamp(&s))
        .transpose()?;

    Ok(Favorite {
        id: row.try_get("id")?,
        user_id: UserId::new(user_id).map_err(|e| DatabaseError::Decode(e.to_string()))?,
        listing_id: row.try_get("listing_id")?,
        price_at_favorite: row.try_get("price_at_favorite")?,
        price_history: serde_json::from_str(&history)?,
        last_checked_at,
        created_at: decode_timestamp(&created_at)?,
    })
}
