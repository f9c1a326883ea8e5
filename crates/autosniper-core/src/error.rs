//! Core error types for AutoSniper.
//!
//! Subsystem crates keep their own error enums; this one covers what the core
//! itself can reject.

use thiserror::Error;

/// Central error type for AutoSniper operations.
#[derive(Error, Debug)]
pub enum AutoSniperError {
    /// Configuration errors (file loading, parsing, validation)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors (invalid input, constraints)
    #[error("validation error: {0}")]
    Validation(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Failed to parse TOML
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// I/O error reading config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Result type alias using `AutoSniperError`.
pub type Result<T> = std::result::Result<T, AutoSniperError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AutoSniperError::Validation("empty user id".to_string());
        assert_eq!(err.to_string(), "validation error: empty user id");

        let err = ConfigError::NoConfigDir;
        assert_eq!(
            err.to_string(),
            "could not determine config directory (XDG base directories not available)"
        );
    }

    #[test]
    fn test_error_from_config() {
        let config_err = ConfigError::InvalidValue {
            field: "scanning.detail_concurrency".to_string(),
            reason: "must be at least 1".to_string(),
        };
        let err: AutoSniperError = config_err.into();
        assert!(matches!(err, AutoSniperError::Config(_)));
        assert!(err.to_string().contains("scanning.detail_concurrency"));
    }
}
