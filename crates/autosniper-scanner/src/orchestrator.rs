//! Scan orchestrator: one scan from results page to notifications.
//!
//! A scan runs extraction, detail enrichment, persistence, matching and
//! notification strictly in that order. On-demand and scheduled scans both
//! go through [`ScanOrchestrator::run_scan`]; only the [`ScanOrigin`] differs.

use crate::enrich::{DetailEnricher, DetailSource};
use crate::error::Result;
use crate::extractor::ExtractionEngine;
use crate::filter::find_matching_filters;
use autosniper_browser::SessionLauncher;
use autosniper_core::{FilterId, Listing, ScanOrigin, ScanningConfig, SearchCriteria, UserId};
use autosniper_db::{filters, listings, Database};
use autosniper_notify::{ListingSummary, NotificationEvent, Notifier};
use std::collections::HashMap;
use std::sync::Arc;

/// Counts reported back to whoever triggered a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Raw records the strategy chain produced
    pub extracted: usize,
    /// Records that were new and got stored
    pub newly_stored: usize,
    /// Newly stored listings that matched at least one active filter
    pub matched: usize,
}

/// Runs scans against the listing source.
pub struct ScanOrchestrator {
    launcher: Arc<dyn SessionLauncher>,
    engine: ExtractionEngine,
    enricher: DetailEnricher,
    db: Database,
    notifier: Notifier,
}

impl ScanOrchestrator {
    /// Create an orchestrator from the `[scanning]` configuration.
    #[must_use]
    pub fn new(
        launcher: Arc<dyn SessionLauncher>,
        detail_source: Arc<dyn DetailSource>,
        db: Database,
        notifier: Notifier,
        config: &ScanningConfig,
    ) -> Self {
        Self {
            launcher,
            engine: ExtractionEngine::new(config.clone()),
            enricher: DetailEnricher::from_config(detail_source, config),
            db,
            notifier,
        }
    }

    /// Replace the extraction engine.
    #[must_use]
    pub fn with_engine(mut self, engine: ExtractionEngine) -> Self {
        self.engine = engine;
        self
    }

    /// The notifier used for fan-out.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Run one scan for `criteria` on behalf of `origin`.
    ///
    /// A blocked or empty results page is not an error; it produces an
    /// all-zero outcome.
    ///
    /// # Errors
    /// Returns `ScanError::SessionUnavailable` if no rendering session can be
    /// launched, and `ScanError::Storage` if persistence or the filter lookup
    /// fails.
    pub async fn run_scan(
        &self,
        criteria: &SearchCriteria,
        origin: &ScanOrigin,
    ) -> Result<ScanOutcome> {
        let criteria = criteria.clone().normalized();
        tracing::info!(
            user_id = ?origin.user_id.as_ref().map(UserId::as_str),
            filter_id = ?origin.filter_id.as_ref().map(FilterId::as_str),
            "scan started"
        );

        let session = self.launcher.launch().await?;
        let mut records = self.engine.extract(session.as_ref(), &criteria).await;
        if let Err(e) = session.close().await {
            tracing::warn!("failed to close rendering session: {}", e);
        }

        let mut outcome = ScanOutcome {
            extracted: records.len(),
            ..ScanOutcome::default()
        };
        if records.is_empty() {
            tracing::info!("scan produced no listings");
            return Ok(outcome);
        }

        self.enricher.enrich(&mut records).await;

        let stored = listings::insert_new_listings(self.db.pool(), &records, origin).await?;
        outcome.newly_stored = stored.len();
        if stored.is_empty() {
            tracing::info!(extracted = outcome.extracted, "no new listings");
            return Ok(outcome);
        }

        outcome.matched = self.match_and_notify(&stored).await?;

        tracing::info!(
            extracted = outcome.extracted,
            newly_stored = outcome.newly_stored,
            matched = outcome.matched,
            "scan finished"
        );
        Ok(outcome)
    }

    /// Match `stored` against every active filter and fan out notifications.
    /// Returns how many listings matched at least one filter.
    async fn match_and_notify(&self, stored: &[Listing]) -> Result<usize> {
        let active = filters::list_active_filters(self.db.pool()).await?;
        if active.is_empty() {
            return Ok(0);
        }

        let mut matched_listings = 0;
        // filter id -> (owner, name, summaries) for the batched bot message
        let mut batches: HashMap<FilterId, (UserId, String, Vec<ListingSummary>)> = HashMap::new();

        for listing in stored {
            let matched = find_matching_filters(&listing.record, &active);
            if matched.is_empty() {
                continue;
            }
            matched_listings += 1;

            for filter in matched {
                let event =
                    NotificationEvent::new_listing(listing, filter.id.clone(), &filter.name);
                self.notifier.notify_realtime(&filter.user_id, &event).await;

                batches
                    .entry(filter.id.clone())
                    .or_insert_with(|| (filter.user_id.clone(), filter.name.clone(), Vec::new()))
                    .2
                    .push(ListingSummary::from(listing));
            }
        }

        for (user_id, name, summaries) in batches.values() {
            self.notifier
                .notify_new_listings(user_id, name, summaries)
                .await;
        }

        Ok(matched_listings)
    }
}
