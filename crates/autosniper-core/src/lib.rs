//! AutoSniper Core - Foundation crate for the AutoSniper listing tracker.
//!
//! This crate provides shared types, error handling and configuration
//! management that all other AutoSniper crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Identifier newtypes (`UserId`, `FilterId`) and scan provenance
//! - [`listing`] - Raw and stored listing records, damage reports
//! - [`criteria`] - Typed optional search criteria
//!
//! # Example
//!
//! ```rust
//! use autosniper_core::{AppConfig, SearchCriteria};
//!
//! let config = AppConfig::default();
//! assert_eq!(config.scanning.detail_concurrency, 5);
//!
//! let criteria = SearchCriteria {
//!     brand: Some("Audi".to_string()),
//!     max_price: Some(900_000.0),
//!     ..SearchCriteria::default()
//! };
//! assert!(!criteria.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod criteria;
pub mod error;
pub mod listing;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, DatabaseConfig, NotificationConfig, ScanningConfig, SchedulerConfig,
};
pub use criteria::SearchCriteria;
pub use error::{AutoSniperError, ConfigError, ConfigResult, Result};
pub use listing::{AccidentHistory, DamageCategory, DamageReport, Listing, RawListing};
pub use types::{FilterId, ScanOrigin, UserId};
