//! AutoSniper Scheduler - recurring scans and maintenance.
//!
//! Each tick selects active filters whose recurring scan is due and runs
//! them one at a time through the scan orchestrator. A run always moves the
//! filter's next-due time one interval past its completion, so a filter that
//! keeps failing is not retried every tick. Retention eviction and favorite
//! price re-checks run on their own periods.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod control;
#[allow(missing_docs)]
pub mod error;
pub mod jobs;
#[allow(missing_docs)]
pub mod scheduler;
pub mod service;

pub use error::{Result, SchedulerError};
pub use jobs::PriceCheckSummary;
pub use scheduler::{is_due, next_due, RunningFilters, ScheduleState, ScheduleStatus};
pub use service::{ScanRunner, SchedulerService};
