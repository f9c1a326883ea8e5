//! Recurring-scan state machine: when a filter is due and where it stands.

use autosniper_core::FilterId;
use autosniper_db::{RecurringSchedule, SavedFilter};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Where a filter's recurring scan stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleState {
    /// Recurring scan is off; there is no next-due time
    Disabled,
    /// Waiting for its next-due time
    Scheduled,
    /// A scan for this filter is executing right now
    Running,
}

/// Read-only projection of a filter's schedule fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStatus {
    pub filter_id: FilterId,
    pub filter_name: String,
    pub enabled: bool,
    pub interval_minutes: i64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_due_at: Option<DateTime<Utc>>,
    pub run_count: i64,
    pub new_listings_found: i64,
    pub state: ScheduleState,
}

impl ScheduleStatus {
    /// Project `filter`; `running` says whether a scan for it is executing.
    #[must_use]
    pub fn project(filter: &SavedFilter, running: bool) -> Self {
        let schedule = &filter.schedule;
        let state = if running {
            ScheduleState::Running
        } else if schedule.enabled {
            ScheduleState::Scheduled
        } else {
            ScheduleState::Disabled
        };

        Self {
            filter_id: filter.id.clone(),
            filter_name: filter.name.clone(),
            enabled: schedule.enabled,
            interval_minutes: schedule.interval_minutes,
            last_run_at: schedule.last_run_at,
            next_due_at: schedule.next_due_at,
            run_count: schedule.run_count,
            new_listings_found: schedule.new_listings_found,
            state,
        }
    }
}

/// Whether a schedule is due at `now`. Enabled without a next-due time counts as due.
#[must_use]
pub fn is_due(schedule: &RecurringSchedule, now: DateTime<Utc>) -> bool {
    schedule.enabled && schedule.next_due_at.map_or(true, |next| next <= now)
}

/// Next-due time after a run that completed at `completed_at`.
#[must_use]
pub fn next_due(completed_at: DateTime<Utc>, interval_minutes: i64) -> DateTime<Utc> {
    completed_at + Duration::minutes(interval_minutes)
}

/// Filters with a scan currently executing, shared between the tick loop and
/// manual triggers.
#[derive(Debug, Clone, Default)]
pub struct RunningFilters {
    ids: Arc<Mutex<HashSet<FilterId>>>,
}

impl RunningFilters {
    /// Mark `id` as running. Returns `None` if it already is.
    #[must_use]
    pub fn try_begin(&self, id: &FilterId) -> Option<RunGuard> {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        ids.insert(id.clone()).then(|| RunGuard {
            ids: Arc::clone(&self.ids),
            id: id.clone(),
        })
    }

    /// Whether a scan for `id` is executing.
    #[must_use]
    pub fn is_running(&self, id: &FilterId) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}

/// Clears the running mark when dropped.
#[derive(Debug)]
pub struct RunGuard {
    ids: Arc<Mutex<HashSet<FilterId>>>,
    id: FilterId,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autosniper_core::{SearchCriteria, UserId};

    fn schedule(enabled: bool, next_due_at: Option<DateTime<Utc>>) -> RecurringSchedule {
        RecurringSchedule {
            enabled,
            interval_minutes: 30,
            last_run_at: None,
            next_due_at,
            run_count: 0,
            new_listings_found: 0,
        }
    }

    fn filter(enabled: bool) -> SavedFilter {
        SavedFilter {
            id: FilterId::generate(),
            user_id: UserId::new("u").expect("valid user id"),
            name: "audi".to_string(),
            criteria: SearchCriteria::default(),
            is_active: true,
            schedule: schedule(enabled, None),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_due_at_or_after_next_run() {
        let now = Utc::now();
        assert!(is_due(&schedule(true, Some(now)), now));
        assert!(is_due(&schedule(true, Some(now - Duration::minutes(1))), now));
        assert!(!is_due(&schedule(true, Some(now + Duration::minutes(1))), now));
    }

    #[test]
    fn test_disabled_is_never_due() {
        let now = Utc::now();
        assert!(!is_due(&schedule(false, None), now));
        assert!(!is_due(&schedule(false, Some(now - Duration::hours(1))), now));
    }

    #[test]
    fn test_enabled_without_next_due_is_due() {
        assert!(is_due(&schedule(true, None), Utc::now()));
    }

    #[test]
    fn test_next_due_is_one_interval_after_completion() {
        let completed = Utc::now();
        assert_eq!(next_due(completed, 45), completed + Duration::minutes(45));
    }

    #[test]
    fn test_projection_states() {
        assert_eq!(ScheduleStatus::project(&filter(false), false).state, ScheduleState::Disabled);
        assert_eq!(ScheduleStatus::project(&filter(true), false).state, ScheduleState::Scheduled);
        assert_eq!(ScheduleStatus::project(&filter(true), true).state, ScheduleState::Running);
    }

    #[test]
    fn test_running_guard_releases_on_drop() {
        let running = RunningFilters::default();
        let id = FilterId::generate();

        let guard = running.try_begin(&id).expect("first run starts");
        assert!(running.is_running(&id));
        assert!(running.try_begin(&id).is_none());

        drop(guard);
        assert!(!running.is_running(&id));
        assert!(running.try_begin(&id).is_some());
    }
}
