//! Error types for cache configuration.

use thiserror::Error;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while building a [`CacheConfig`](crate::CacheConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field name setting was empty.
    #[error("invalid setting `{setting}`: field name must not be empty")]
    EmptyField { setting: &'static str },

    /// Settings could not be deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
