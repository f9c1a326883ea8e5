use thiserror::Error;

pub type Result<T> = std::result::Result<T, NotifyError>;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// Transport failure. The request URL is stripped since it embeds the bot token.
    #[error("http error: {0}")]
    Http(reqwest::Error),

    #[error("bot api returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("bot api rejected message: {0}")]
    Rejected(String),

    #[error("messaging bot not configured")]
    NotConfigured,

    #[error("channel lookup failed: {0}")]
    Storage(#[from] autosniper_db::DatabaseError),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.without_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NotifyError::Rejected("chat not found".to_string());
        assert_eq!(err.to_string(), "bot api rejected message: chat not found");

        let err = NotifyError::Api {
            status: 401,
            message: "Unauthorized".to_string(),
        };
        assert!(err.to_string().contains("401"));
    }
}
