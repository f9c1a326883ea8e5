use autosniper_db::DatabaseError;
use autosniper_scanner::ScanError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("filter not found: {0}")]
    FilterNotFound(String),

    #[error("a scan for filter {0} is already running")]
    AlreadyRunning(String),

    #[error("scan interval must be positive, got {0} minutes")]
    InvalidInterval(i64),

    #[error("scheduler is already started")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
