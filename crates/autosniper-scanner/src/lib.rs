//! AutoSniper Scanner - Listing acquisition and scan orchestration.
//!
//! This crate turns a set of search criteria into stored, matched and
//! notified listings. It drives a rendering session through the results page,
//! recovers records with a chain of extraction strategies, enriches them from
//! their detail pages, stores the new ones and matches them against every
//! active saved search.
//!
//! # Features
//!
//! - Query construction from typed, optional criteria
//! - Block detection with a single reload retry
//! - Ordered extraction strategies with a minimum-yield threshold
//! - Detail enrichment with bounded concurrency and per-fetch timeouts
//! - Pure filter matching
//!
//! # Example
//!
//! ```rust,ignore
//! use autosniper_scanner::{HttpDetailSource, ScanOrchestrator};
//! use autosniper_core::{ScanOrigin, SearchCriteria};
//! use std::sync::Arc;
//!
//! let orchestrator = ScanOrchestrator::new(
//!     Arc::new(browser_engine),
//!     Arc::new(HttpDetailSource::from_config(&config.scanning)?),
//!     database,
//!     notifier,
//!     &config.scanning,
//! );
//!
//! let outcome = orchestrator
//!     .run_scan(&criteria, &ScanOrigin::on_demand(user_id))
//!     .await?;
//! println!("{} new, {} matched", outcome.newly_stored, outcome.matched);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod enrich;
#[allow(missing_docs)]
pub mod error;
pub mod extractor;
pub mod filter;
#[allow(missing_docs)]
pub mod normalize;
pub mod orchestrator;
pub mod strategy;
#[allow(missing_docs)]
pub mod url_builder;

// Re-export commonly used types
pub use enrich::{parse_detail_page, DetailEnricher, DetailInfo, DetailSource, HttpDetailSource};
pub use error::{Result, ScanError};
pub use extractor::{is_blocked, ExtractionEngine};
pub use filter::{find_matching_filters, matches};
pub use orchestrator::{ScanOrchestrator, ScanOutcome};
pub use strategy::{ExtractionStrategy, ResultPage, StrategyChain};
pub use url_builder::build_search_url;
