//! Error types for core parsing and configuration.

use thiserror::Error;

/// A job identifier that is not a non-negative decimal integer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid entity id: {0:?}")]
pub struct ParseIdError(pub String);

/// Errors raised while loading or validating `streamwatch.toml`.
///
/// All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}
