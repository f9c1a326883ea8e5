//! Listing storage and the race-tolerant persistence gate.
//!
//! A listing is identified by its `source_url`. [`insert_new_listings`] takes
//! one snapshot of which URLs already exist, then inserts the rest one by one,
//! treating a uniqueness violation as another writer having won the race.

use crate::error::{DatabaseError, Result};
use crate::{decode_timestamp, encode_timestamp};
use autosniper_core::{DamageReport, FilterId, Listing, RawListing, ScanOrigin, UserId};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use std::collections::HashSet;

const LISTING_COLUMNS: &str = "id, source_url, title, price, year, brand, model, fuel_type, \
     transmission, mileage, city, description, images, damage, scraped_at, is_new, \
     user_id, filter_id";

/// Keys per `IN (...)` lookup.
const LOOKUP_CHUNK: usize = 500;

/// Stored titles are cut to this many characters.
pub const MAX_TITLE_CHARS: usize = 500;

/// Return which of `urls` are already stored.
///
/// # Errors
/// Returns `DatabaseError` if the lookup query fails.
pub async fn existing_source_urls(pool: &Pool<Sqlite>, urls: &[&str]) -> Result<HashSet<String>> {
    let mut existing = HashSet::new();
    for chunk in urls.chunks(LOOKUP_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT source_url FROM listings WHERE source_url IN (");
        let mut separated = builder.separated(", ");
        for url in chunk {
            separated.push_bind(*url);
        }
        separated.push_unseparated(")");

        let rows: Vec<(String,)> = builder.build_query_as().fetch_all(pool).await?;
        existing.extend(rows.into_iter().map(|(url,)| url));
    }
    Ok(existing)
}

/// Persist the records of `batch` whose identity key is not stored yet.
///
/// Returns the listings this call actually created. A record that another
/// writer inserted between the snapshot and the insert is skipped, not an
/// error.
///
/// # Errors
/// Returns `DatabaseError` for failures other than a uniqueness collision.
pub async fn insert_new_listings(
    pool: &Pool<Sqlite>,
    batch: &[RawListing],
    origin: &ScanOrigin,
) -> Result<Vec<Listing>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }

    let urls: Vec<&str> = batch.iter().map(|r| r.source_url.as_str()).collect();
    let existing = existing_source_urls(pool, &urls).await?;

    let mut seen: HashSet<&str> = HashSet::new();
    let mut created = Vec::new();

    for record in batch {
        let url = record.source_url.as_str();
        if url.is_empty() || existing.contains(url) || !seen.insert(url) {
            continue;
        }

        match insert_listing(pool, record, origin).await {
            Ok(listing) => created.push(listing),
            Err(DatabaseError::Sqlx(sqlx::Error::Database(e))) if e.is_unique_violation() => {
                tracing::warn!(url = %url, "listing inserted concurrently, skipping");
            }
            Err(e) => return Err(e),
        }
    }

    tracing::debug!(
        batch = batch.len(),
        already_stored = existing.len(),
        created = created.len(),
        "persisted listing batch"
    );
    Ok(created)
}

async fn insert_listing(
    pool: &Pool<Sqlite>,
    record: &RawListing,
    origin: &ScanOrigin,
) -> Result<Listing> {
    let scraped_at = Utc::now();
    let mut record = record.clone();
    if record.title.chars().count() > MAX_TITLE_CHARS {
        record.title = record.title.chars().take(MAX_TITLE_CHARS).collect();
    }
    let images = serde_json::to_string(&record.images)?;
    let damage = record
        .damage
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let result = sqlx::query(
        "INSERT INTO listings (source_url, title, price, year, brand, model, fuel_type,
             transmission, mileage, city, description, images, damage, scraped_at, is_new,
             user_id, filter_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(&record.source_url)
    .bind(&record.title)
    .bind(record.price)
    .bind(record.year)
    .bind(&record.brand)
    .bind(&record.model)
    .bind(&record.fuel_type)
    .bind(&record.transmission)
    .bind(record.mileage)
    .bind(&record.city)
    .bind(&record.description)
    .bind(images)
    .bind(damage)
    .bind(encode_timestamp(scraped_at))
    .bind(origin.user_id.as_ref().map(UserId::as_str))
    .bind(origin.filter_id.as_ref().map(FilterId::as_str))
    .execute(pool)
    .await?;

    Ok(Listing {
        id: result.last_insert_rowid(),
        record,
        scraped_at,
        is_new: true,
        user_id: origin.user_id.clone(),
        filter_id: origin.filter_id.clone(),
    })
}

/// Get a listing by row id.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a column cannot be decoded.
pub async fn get_listing(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Listing>> {
    let row = sqlx::query(&format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| parse_listing_row(&r)).transpose()
}

/// Get a listing by its identity key.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a column cannot be decoded.
pub async fn get_listing_by_url(
    pool: &Pool<Sqlite>,
    source_url: &str,
) -> Result<Option<Listing>> {
    let row = sqlx::query(&format!(
        "SELECT {LISTING_COLUMNS} FROM listings WHERE source_url = ?"
    ))
    .bind(source_url)
    .fetch_optional(pool)
    .await?;

    row.map(|r| parse_listing_row(&r)).transpose()
}

/// Count stored listings.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn count_listings(pool: &Pool<Sqlite>) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM listings")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Refresh the fields price re-checking is allowed to change.
///
/// `mileage` and `damage` are only overwritten when provided.
///
/// # Errors
/// Returns `DatabaseError::NotFoundWithMessage` if no listing has that id.
pub async fn refresh_listing(
    pool: &Pool<Sqlite>,
    id: i64,
    price: f64,
    mileage: Option<i64>,
    damage: Option<&DamageReport>,
) -> Result<()> {
    let damage = damage.map(serde_json::to_string).transpose()?;

    let result = sqlx::query(
        "UPDATE listings
         SET price = ?, mileage = COALESCE(?, mileage), damage = COALESCE(?, damage)
         WHERE id = ?",
    )
    .bind(price)
    .bind(mileage)
    .bind(damage)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFoundWithMessage(format!(
            "Listing '{id}' not found"
        )));
    }
    Ok(())
}

/// Counts removed by [`delete_listings_older_than`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionOutcome {
    /// Listings removed
    pub listings: u64,
    /// Favorites removed along with their listings
    pub favorites: u64,
}

/// Delete listings stored before `cutoff` together with their favorites.
///
/// Runs in one transaction; favorites are removed first so no favorite ever
/// points at a missing listing.
///
/// # Errors
/// Returns `DatabaseError` if either delete fails; nothing is removed then.
pub async fn delete_listings_older_than(
    pool: &Pool<Sqlite>,
    cutoff: DateTime<Utc>,
) -> Result<RetentionOutcome> {
    let cutoff = encode_timestamp(cutoff);
    let mut tx = pool.begin().await?;

    let favorites = sqlx::query(
        "DELETE FROM favorites
         WHERE listing_id IN (SELECT id FROM listings WHERE scraped_at < ?)",
    )
    .bind(&cutoff)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let listings = sqlx::query("DELETE FROM listings WHERE scraped_at < ?")
        .bind(&cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    Ok(RetentionOutcome {
        listings,
        favorites,
    })
}

/// Remove one listing together with every favorite pointing at it.
///
/// Returns how many favorites went with it.
///
/// # Errors
/// Returns `DatabaseError::NotFoundWithMessage` if no listing has that id;
/// nothing is removed then.
pub async fn delete_listing(pool: &Pool<Sqlite>, id: i64) -> Result<u64> {
    let mut tx = pool.begin().await?;

    let favorites = sqlx::query("DELETE FROM favorites WHERE listing_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let deleted = sqlx::query("DELETE FROM listings WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        tx.rollback().await?;
        return Err(DatabaseError::NotFoundWithMessage(format!(
            "Listing '{id}' not found"
        )));
    }

    tx.commit().await?;
    Ok(favorites)
}

pub(crate) fn parse_listing_row(row: &SqliteRow) -> Result<Listing> {
    let images_json: String = row.try_get("images")?;
    let images: Vec<String> = serde_json::from_str(&images_json)?;

    let damage = row
        .try_get::<Option<String>, _>("damage")?
        .map(|json| serde_json::from_str::<DamageReport>(&json))
        .transpose()?;

    let user_id = row
        .try_get::<Option<String>, _>("user_id")?
        .map(UserId::new)
        .transpose()
        .map_err(|e| DatabaseError::Decode(e.to_string()))?;
    let filter_id = row
        .try_get::<Option<String>, _>("filter_id")?
        .map(FilterId::new)
        .transpose()
        .map_err(|e| DatabaseError::Decode(e.to_string()))?;

    let scraped_at: String = row.try_get("scraped_at")?;

    Ok(Listing {
        id: row.try_get("id")?,
        record: RawListing {
            source_url: row.try_get("source_url")?,
            title: row.try_get("title")?,
            price: row.try_get("price")?,
            year: row.try_get("year")?,
            brand: row.try_get("brand")?,
            model: row.try_get("model")?,
            fuel_type: row.try_get("fuel_type")?,
            transmission: row.try_get("transmission")?,
            mileage: row.try_get("mileage")?,
            city: row.try_get("city")?,
            description: row.try_get("description")?,
            images,
            damage,
        },
        scraped_at: decode_timestamp(&scraped_at)?,
        is_new: row.try_get::<i64, _>("is_new")? != 0,
        user_id,
        filter_id,
    })
}
