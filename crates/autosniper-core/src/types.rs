//! Shared identifier types used across AutoSniper.
//!
//! Identifiers are opaque strings supplied by the account layer (users) or
//! generated here (filters). Validation only rejects values that cannot be
//! stored or logged safely.

use crate::error::{AutoSniperError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

fn id_regex() -> &'static Regex {
    static ID_REGEX: OnceLock<Regex> = OnceLock::new();
    ID_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.:@-]{1,128}$").expect("valid regex"))
}

fn validate_id(kind: &str, id: &str) -> Result<()> {
    if id_regex().is_match(id) {
        Ok(())
    } else {
        Err(AutoSniperError::Validation(format!(
            "invalid {kind} ID: expected 1-128 characters from [A-Za-z0-9_.:@-], got '{id}'"
        )))
    }
}

/// Identity of a listing owner, issued by the account layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a new `UserId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains unsupported characters.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_id("user", &id)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a saved search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilterId(String);

impl FilterId {
    /// Create a new `FilterId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains unsupported characters.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_id("filter", &id)?;
        Ok(Self(id))
    }

    /// Create a new random `FilterId` using UUID v4.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who a scan runs on behalf of.
///
/// Scheduled scans carry the filter that triggered them; on-demand scans
/// carry only the requesting owner.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanOrigin {
    /// Owner the stored listings are attributed to
    pub user_id: Option<UserId>,
    /// Saved search that triggered the scan
    pub filter_id: Option<FilterId>,
}

impl ScanOrigin {
    /// Origin for an on-demand scan requested by `user_id`.
    #[must_use]
    pub fn on_demand(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            filter_id: None,
        }
    }

    /// Origin for a scheduled scan of `filter_id` owned by `user_id`.
    #[must_use]
    pub fn scheduled(user_id: UserId, filter_id: FilterId) -> Self {
        Self {
            user_id: Some(user_id),
            filter_id: Some(filter_id),
        }
    }
}
