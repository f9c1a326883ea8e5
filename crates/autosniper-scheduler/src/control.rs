//! Schedule control: enable, disable, trigger and report.

use crate::error::{Result, SchedulerError};
use crate::scheduler::ScheduleStatus;
use crate::service::SchedulerService;
use autosniper_core::{FilterId, UserId};
use autosniper_db::{filters, SavedFilter};
use autosniper_scanner::ScanOutcome;
use chrono::Utc;

impl SchedulerService {
    async fn load_filter(&self, id: &FilterId) -> Result<SavedFilter> {
        filters::get_filter(self.db.pool(), id)
            .await?
            .ok_or_else(|| SchedulerError::FilterNotFound(id.to_string()))
    }

    /// Turn on recurring scan for `id`; the first run is due one interval from now.
    ///
    /// # Errors
    /// Returns `SchedulerError::InvalidInterval` for a non-positive interval
    /// and `SchedulerError::FilterNotFound` for an unknown filter.
    pub async fn enable(&self, id: &FilterId, interval_minutes: i64) -> Result<ScheduleStatus> {
        if interval_minutes <= 0 {
            return Err(SchedulerError::InvalidInterval(interval_minutes));
        }
        self.load_filter(id).await?;
        filters::enable_recurring(self.db.pool(), id, interval_minutes, Utc::now()).await?;
        tracing::info!(filter_id = %id, interval_minutes, "recurring scan enabled");
        self.status(id).await
    }

    /// Turn off recurring scan for `id`. A run in progress finishes but does
    /// not schedule another.
    pub async fn disable(&self, id: &FilterId) -> Result<ScheduleStatus> {
        self.load_filter(id).await?;
        filters::disable_recurring(self.db.pool(), id).await?;
        tracing::info!(filter_id = %id, "recurring scan disabled");
        self.status(id).await
    }

    /// Run the scan for `id` now, through the same path as a scheduled run.
    ///
    /// # Errors
    /// Returns `SchedulerError::AlreadyRunning` while a scan for this filter
    /// executes, and `SchedulerError::Scan` if the scan itself fails (the
    /// schedule is advanced either way).
    pub async fn trigger_now(&self, id: &FilterId) -> Result<ScanOutcome> {
        let filter = self.load_filter(id).await?;
        let guard = self
            .running
            .try_begin(id)
            .ok_or_else(|| SchedulerError::AlreadyRunning(id.to_string()))?;
        tracing::info!(filter_id = %id, "manual scan triggered");
        Ok(self.run_filter(&filter, guard).await?)
    }

    /// Schedule status of one filter.
    pub async fn status(&self, id: &FilterId) -> Result<ScheduleStatus> {
        let filter = self.load_filter(id).await?;
        Ok(ScheduleStatus::project(&filter, self.running.is_running(id)))
    }

    /// Schedule status of every filter `user_id` owns.
    pub async fn status_for_user(&self, user_id: &UserId) -> Result<Vec<ScheduleStatus>> {
        let owned = filters::list_filters_for_user(self.db.pool(), user_id).await?;
        Ok(owned
            .iter()
            .map(|filter| ScheduleStatus::project(filter, self.running.is_running(&filter.id)))
            .collect())
    }
}
