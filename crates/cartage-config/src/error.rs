//! Error types for configuration operations.
//!
//! # Design
//! - Constant error messages with structured context fields.
//! - The variable name is always carried so operators can fix the environment.

use thiserror::Error;

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable was absent.
    #[error("missing environment variable")]
    MissingVar {
        /// Name of the missing variable.
        name: &'static str,
    },
    /// An environment variable held a value that failed parsing or validation.
    #[error("invalid environment variable")]
    InvalidVar {
        /// Name of the offending variable.
        name: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value as read from the environment.
        value: String,
    },
}

impl ConfigError {
    pub(crate) const fn missing(name: &'static str) -> Self {
        Self::MissingVar { name }
    }

    pub(crate) const fn invalid(name: &'static str, reason: &'static str, value: String) -> Self {
        Self::InvalidVar {
            name,
            reason,
            value,
        }
    }
}
