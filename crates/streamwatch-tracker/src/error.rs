//! Tracker error types.

use thiserror::Error;

use streamwatch_core::EntityId;
use streamwatch_remote::{FetchError, RemoteError};

/// Lookup misses surfaced to readers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("job {id} not found in instance {instance}")]
    JobNotFound { instance: String, id: EntityId },

    #[error("no job named {name:?} in instance {instance}")]
    JobNameNotFound { instance: String, name: String },
}

pub type TrackerResult<T> = Result<T, TrackerError>;

/// Why one part of a refresh cycle failed.
///
/// `Remote` means the endpoint call itself failed; `Fetch` means the
/// endpoint handed out a token but the payload could not be retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("payload retrieval failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("malformed payload: {0}")]
    Decode(String),
}

impl RefreshError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, RefreshError::Remote(e) if e.is_connectivity())
    }
}
