//! Vehicle listing records.
//!
//! [`RawListing`] is what extraction and enrichment produce; [`Listing`] is a
//! record after it has been stored and given a row id.

use crate::types::{FilterId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A vehicle record harvested from a results page, optionally enriched from
/// its detail page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawListing {
    /// Canonical source URL, the listing's identity key
    pub source_url: String,
    /// Human-readable title
    pub title: String,
    /// Price in TL, 0 when unknown
    pub price: f64,
    /// Model year
    pub year: Option<i32>,
    /// Manufacturer
    pub brand: Option<String>,
    /// Model name
    pub model: Option<String>,
    /// Fuel type as shown on the source (e.g. `dizel`)
    pub fuel_type: Option<String>,
    /// Transmission as shown on the source (e.g. `otomatik`)
    pub transmission: Option<String>,
    /// Odometer reading in kilometres
    pub mileage: Option<i64>,
    /// City the vehicle is offered in
    pub city: Option<String>,
    /// Free-text description
    pub description: Option<String>,
    /// Image URLs, primary image first
    pub images: Vec<String>,
    /// Per-part condition report from the detail page
    pub damage: Option<DamageReport>,
}

impl RawListing {
    /// Create a record with only its identity, title and price set.
    #[must_use]
    pub fn new(source_url: impl Into<String>, title: impl Into<String>, price: f64) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
            price,
            ..Self::default()
        }
    }
}

/// A listing as stored by the persistence gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Row id
    pub id: i64,
    /// Harvested fields
    #[serde(flatten)]
    pub record: RawListing,
    /// When the listing was first stored
    pub scraped_at: DateTime<Utc>,
    /// Whether the listing has not been seen by its owner yet
    pub is_new: bool,
    /// Owner the listing was stored for
    pub user_id: Option<UserId>,
    /// Saved search whose scheduled scan found the listing
    pub filter_id: Option<FilterId>,
}

/// Condition category of a single body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageCategory {
    /// Factory original
    Original,
    /// Painted in a limited area
    LocalPainted,
    /// Fully repainted
    Painted,
    /// Replaced with another part
    Changed,
    /// Seller gave no information
    Unspecified,
}

impl DamageCategory {
    /// Map the source's textual condition code.
    ///
    /// Returns `None` for codes that are not recognized so the caller can fall
    /// back to the numeric code.
    #[must_use]
    pub fn from_value_text(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "original" => Some(Self::Original),
            "painted" => Some(Self::Painted),
            "localpainted" | "local_painted" => Some(Self::LocalPainted),
            "changed" | "replaced" => Some(Self::Changed),
            "unknown" | "notspecified" => Some(Self::Unspecified),
            _ => None,
        }
    }

    /// Map the source's numeric condition code.
    #[must_use]
    pub fn from_value_code(code: i64) -> Self {
        match code {
            1 => Self::Original,
            2 => Self::LocalPainted,
            3 => Self::Painted,
            4 => Self::Changed,
            _ => Self::Unspecified,
        }
    }
}

/// Declared accident-history (insurance record) amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum AccidentHistory {
    /// The page explicitly states the amount is not declared
    Unspecified,
    /// Declared amount in TL
    Amount(f64),
}

/// Part names grouped by condition, plus the accident-history amount.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DamageReport {
    /// Factory original parts
    pub original: Vec<String>,
    /// Locally painted parts
    pub local_painted: Vec<String>,
    /// Painted parts
    pub painted: Vec<String>,
    /// Replaced parts
    pub changed: Vec<String>,
    /// Parts without information
    pub unspecified: Vec<String>,
    /// Accident-history amount, `None` when the page had no marker at all
    pub accident_history: Option<AccidentHistory>,
}

impl DamageReport {
    /// Record `part` under `category`.
    pub fn insert(&mut self, category: DamageCategory, part: impl Into<String>) {
        let bucket = match category {
            DamageCategory::Original => &mut self.original,
            DamageCategory::LocalPainted => &mut self.local_painted,
            DamageCategory::Painted => &mut self.painted,
            DamageCategory::Changed => &mut self.changed,
            DamageCategory::Unspecified => &mut self.unspecified,
        };
        bucket.push(part.into());
    }

    /// Parts recorded under `category`.
    #[must_use]
    pub fn parts(&self, category: DamageCategory) -> &[String] {
        match category {
            DamageCategory::Original => &self.original,
            DamageCategory::LocalPainted => &self.local_painted,
            DamageCategory::Painted => &self.painted,
            DamageCategory::Changed => &self.changed,
            DamageCategory::Unspecified => &self.unspecified,
        }
    }

    /// True when neither parts nor an accident-history marker were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
            && self.local_painted.is_empty()
            && self.painted.is_empty()
            && self.changed.is_empty()
            && self.unspecified.is_empty()
            && self.accident_history.is_none()
    }
}
