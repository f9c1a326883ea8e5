//! Real-time event payloads.

use autosniper_core::{FilterId, Listing};
use serde::{Deserialize, Serialize};

/// The listing fields carried in an event and in bot messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSummary {
    /// Stored listing id
    pub id: i64,
    /// Title
    pub title: String,
    /// Price in TL
    pub price: f64,
    /// Identity URL
    pub source_url: String,
}

impl From<&Listing> for ListingSummary {
    fn from(listing: &Listing) -> Self {
        Self {
            id: listing.id,
            title: listing.record.title.clone(),
            price: listing.record.price,
            source_url: listing.record.source_url.clone(),
        }
    }
}

/// A message pushed to a user's live sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A newly stored listing matched one of the user's filters
    NewListing {
        /// Human-readable line for display
        message: String,
        /// The matched listing
        listing: ListingSummary,
        /// Matching filter
        filter_id: FilterId,
        /// Matching filter's name
        filter_name: String,
    },
}

impl NotificationEvent {
    /// Build a `new_listing` event for `listing` matching the named filter.
    #[must_use]
    pub fn new_listing(listing: &Listing, filter_id: FilterId, filter_name: &str) -> Self {
        Self::NewListing {
            message: format!(
                "Filtrenize uyan yeni ilan bulundu: {}",
                listing.record.title
            ),
            listing: ListingSummary::from(listing),
            filter_id,
            filter_name: filter_name.to_string(),
        }
    }
}
