use autosniper_browser::BrowserError;
use autosniper_db::DatabaseError;
use thiserror::Error;

/// Errors surfaced by a scan.
///
/// Extraction shortfalls, detail failures and notification failures never
/// show up here; they degrade to smaller results instead.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("rendering session unavailable: {0}")]
    SessionUnavailable(#[from] BrowserError),

    #[error("storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("detail page returned HTTP {0}")]
    DetailStatus(u16),

    #[error("detail fetch failed: {0}")]
    DetailFetch(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
