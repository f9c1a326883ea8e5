//! The recurring scan driver and its maintenance loops.
//!
//! One tick loop runs due filters sequentially, so at most one scheduled scan
//! holds a rendering session at a time. Retention and price re-checks run on
//! their own, longer periods. All loops stop at the next wait once
//! [`SchedulerService::stop`] is called; a scan in progress is finished first.

use crate::error::{Result, SchedulerError};
use crate::jobs::{run_price_check, run_retention, PriceCheckSummary};
use crate::scheduler::{next_due, RunGuard, RunningFilters};
use async_trait::async_trait;
use autosniper_core::{FilterId, ScanOrigin, SchedulerConfig, SearchCriteria};
use autosniper_db::{filters, Database, RetentionOutcome, SavedFilter};
use autosniper_notify::Notifier;
use autosniper_scanner::{DetailSource, ScanError, ScanOrchestrator, ScanOutcome};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Whatever executes one scan; the orchestrator in production.
#[async_trait]
pub trait ScanRunner: Send + Sync {
    /// Run one scan for `criteria` on behalf of `origin`.
    async fn run_scan(
        &self,
        criteria: &SearchCriteria,
        origin: &ScanOrigin,
    ) -> autosniper_scanner::Result<ScanOutcome>;
}

#[async_trait]
impl ScanRunner for ScanOrchestrator {
    async fn run_scan(
        &self,
        criteria: &SearchCriteria,
        origin: &ScanOrigin,
    ) -> autosniper_scanner::Result<ScanOutcome> {
        ScanOrchestrator::run_scan(self, criteria, origin).await
    }
}

struct Lifecycle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Recurring scan service. Clones share all state.
#[derive(Clone)]
pub struct SchedulerService {
    pub(crate) db: Database,
    runner: Arc<dyn ScanRunner>,
    details: Arc<dyn DetailSource>,
    notifier: Notifier,
    config: SchedulerConfig,
    pub(crate) running: RunningFilters,
    failures: Arc<Mutex<HashMap<FilterId, u32>>>,
    lifecycle: Arc<Mutex<Option<Lifecycle>>>,
}

impl SchedulerService {
    /// Create a stopped service.
    pub fn new(
        db: Database,
        runner: Arc<dyn ScanRunner>,
        details: Arc<dyn DetailSource>,
        notifier: Notifier,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            db,
            runner,
            details,
            notifier,
            config,
            running: RunningFilters::default(),
            failures: Arc::new(Mutex::new(HashMap::new())),
            lifecycle: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn the tick, retention and price-check loops.
    ///
    /// # Errors
    /// Returns `SchedulerError::AlreadyStarted` if the loops are running.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if lifecycle.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }

        let cancel = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(self.clone().tick_loop(cancel.clone())),
            tokio::spawn(self.clone().retention_loop(cancel.clone())),
            tokio::spawn(self.clone().price_check_loop(cancel.clone())),
        ];
        *lifecycle = Some(Lifecycle { cancel, tasks });

        tracing::info!(
            tick_secs = self.config.tick_secs,
            retention_days = self.config.retention_days,
            "scheduler started"
        );
        Ok(())
    }

    /// Signal every loop to stop and wait for them to exit.
    pub async fn stop(&self) {
        let lifecycle = self
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Lifecycle { cancel, tasks }) = lifecycle else {
            return;
        };

        cancel.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("scheduler task ended abnormally: {}", e);
            }
        }
        tracing::info!("scheduler stopped");
    }

    /// Whether the loops are running.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run every filter due at `now`, one after another. Returns how many ran.
    pub async fn tick(&self, now: DateTime<Utc>) -> usize {
        self.tick_until(now, &CancellationToken::new()).await
    }

    async fn tick_until(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> usize {
        let due = match filters::list_due_filters(self.db.pool(), now).await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!("could not load due filters: {}", e);
                return 0;
            }
        };
        if due.is_empty() {
            return 0;
        }
        tracing::info!(count = due.len(), "filters due for a scheduled scan");

        let mut ran = 0;
        for filter in &due {
            if cancel.is_cancelled() {
                tracing::info!("scheduler stopping, remaining due filters wait for the next start");
                break;
            }
            let Some(guard) = self.running.try_begin(&filter.id) else {
                tracing::debug!(filter_id = %filter.id, "scan already running, skipping");
                continue;
            };
            // Failures are recorded and logged inside; the tick carries on.
            let _ = self.run_filter(filter, guard).await;
            ran += 1;
        }
        ran
    }

    /// Run one filter's scan and advance its schedule, success or not.
    ///
    /// The guard keeps the filter in the Running state until this returns.
    pub(crate) async fn run_filter(
        &self,
        filter: &SavedFilter,
        _guard: RunGuard,
    ) -> std::result::Result<ScanOutcome, ScanError> {
        let origin = ScanOrigin::scheduled(filter.user_id.clone(), filter.id.clone());
        tracing::info!(filter_id = %filter.id, name = %filter.name, "scheduled scan started");

        let result = self.runner.run_scan(&filter.criteria, &origin).await;
        let completed_at = Utc::now();

        let found = match &result {
            Ok(outcome) => {
                self.clear_failures(&filter.id);
                tracing::info!(
                    filter_id = %filter.id,
                    newly_stored = outcome.newly_stored,
                    matched = outcome.matched,
                    "scheduled scan finished"
                );
                Some(i64::try_from(outcome.newly_stored).unwrap_or(i64::MAX))
            }
            Err(e) => {
                let consecutive = self.count_failure(&filter.id);
                tracing::error!(
                    filter_id = %filter.id,
                    consecutive_failures = consecutive,
                    next_due = %next_due(completed_at, filter.schedule.interval_minutes),
                    "scheduled scan failed, advancing schedule anyway: {}",
                    e
                );
                None
            }
        };

        if let Err(e) = filters::record_run(self.db.pool(), &filter.id, completed_at, found).await {
            tracing::error!(filter_id = %filter.id, "could not record scan run: {}", e);
        }
        result
    }

    /// Evict listings past the retention age.
    pub async fn run_retention(&self, now: DateTime<Utc>) -> Result<RetentionOutcome> {
        run_retention(&self.db, self.config.retention_days, now).await
    }

    /// Re-check every tracked favorite's price.
    pub async fn run_price_check(&self, now: DateTime<Utc>) -> Result<PriceCheckSummary> {
        run_price_check(&self.db, self.details.as_ref(), &self.notifier, now).await
    }

    fn count_failure(&self, id: &FilterId) -> u32 {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(id.clone()).or_insert(0);
        *count += 1;
        *count
    }

    fn clear_failures(&self, id: &FilterId) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    async fn tick_loop(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.tick_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick_until(Utc::now(), &cancel).await;
        }
        tracing::debug!("tick loop exited");
    }

    async fn retention_loop(self, cancel: CancellationToken) {
        let initial = Duration::from_secs(self.config.initial_cleanup_delay_secs);
        let period = Duration::from_secs(self.config.retention_interval_hours.max(1) * 3600);
        let mut wait = initial;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
            if let Err(e) = self.run_retention(Utc::now()).await {
                tracing::error!("retention eviction failed: {}", e);
            }
            wait = period;
        }
        tracing::debug!("retention loop exited");
    }

    async fn price_check_loop(self, cancel: CancellationToken) {
        let period = Duration::from_secs(self.config.price_check_interval_hours.max(1) * 3600);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(period) => {}
            }
            if let Err(e) = self.run_price_check(Utc::now()).await {
                tracing::error!("price check failed: {}", e);
            }
        }
        tracing::debug!("price check loop exited");
    }
}
