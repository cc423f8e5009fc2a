//! streamwatch-core — shared vocabulary for the streamwatch crates.
//!
//! Holds the identifiers and status enums reported by the remote
//! management endpoint, the freshness triple attached to every cached
//! payload, and the `streamwatch.toml` configuration model.

pub mod config;
pub mod error;
pub mod types;

pub use config::{RefreshMode, StreamwatchConfig};
pub use error::{ConfigError, ParseIdError};
pub use types::*;
