//! Maintenance jobs: retention eviction and favorite price re-checks.

use crate::error::Result;
use autosniper_db::{favorites, listings, Database, PricePoint, RetentionOutcome, TrackedListing};
use autosniper_notify::Notifier;
use autosniper_scanner::{parse_detail_page, DetailSource};
use chrono::{DateTime, Duration, Utc};

/// Counts from one price re-check pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceCheckSummary {
    /// Favorites whose page was fetched and priced
    pub checked: usize,
    /// Favorites whose price changed
    pub changed: usize,
    /// Changes that were decreases
    pub dropped: usize,
}

/// Delete listings (and their favorites) older than `retention_days` at `now`.
pub async fn run_retention(
    db: &Database,
    retention_days: i64,
    now: DateTime<Utc>,
) -> Result<RetentionOutcome> {
    let cutoff = now - Duration::days(retention_days);
    let outcome = listings::delete_listings_older_than(db.pool(), cutoff).await?;
    tracing::info!(
        cutoff = %cutoff,
        listings = outcome.listings,
        favorites = outcome.favorites,
        "retention eviction finished"
    );
    Ok(outcome)
}

/// Re-fetch every tracked favorite and record price changes.
///
/// A favorite that fails at any step is logged and skipped; the pass
/// continues with the next one.
pub async fn run_price_check(
    db: &Database,
    details: &dyn DetailSource,
    notifier: &Notifier,
    now: DateTime<Utc>,
) -> Result<PriceCheckSummary> {
    let tracked = favorites::list_tracked_listings(db.pool()).await?;
    let mut summary = PriceCheckSummary::default();

    for item in &tracked {
        let html = match details.fetch(&item.source_url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(url = %item.source_url, "price check fetch failed: {}", e);
                continue;
            }
        };
        let detail = parse_detail_page(&html, 0);
        let Some(price) = detail.price else {
            tracing::warn!(url = %item.source_url, "no price on listing page");
            continue;
        };
        summary.checked += 1;

        if (price - item.current_price).abs() < 1.0 {
            continue;
        }
        if let Err(e) = record_change(db, notifier, item, price, &detail, now).await {
            tracing::warn!(
                favorite_id = item.favorite.id,
                url = %item.source_url,
                "price change not recorded: {}",
                e
            );
            continue;
        }
        summary.changed += 1;
        if price < item.current_price {
            summary.dropped += 1;
        }
    }

    tracing::info!(
        tracked = tracked.len(),
        checked = summary.checked,
        changed = summary.changed,
        dropped = summary.dropped,
        "price check finished"
    );
    Ok(summary)
}

async fn record_change(
    db: &Database,
    notifier: &Notifier,
    item: &TrackedListing,
    price: f64,
    detail: &autosniper_scanner::DetailInfo,
    now: DateTime<Utc>,
) -> Result<()> {
    let old_price = item.current_price;
    listings::refresh_listing(
        db.pool(),
        item.favorite.listing_id,
        price,
        detail.mileage,
        detail.damage.as_ref(),
    )
    .await?;
    favorites::record_price_change(
        db.pool(),
        item.favorite.id,
        &PricePoint {
            price,
            old_price,
            date: now,
        },
    )
    .await?;

    tracing::info!(
        favorite_id = item.favorite.id,
        old_price,
        new_price = price,
        "listing price changed"
    );

    if price < old_price {
        notifier
            .notify_price_drop(
                &item.favorite.user_id,
                &item.title,
                old_price,
                price,
                &item.source_url,
            )
            .await;
    }
    Ok(())
}
