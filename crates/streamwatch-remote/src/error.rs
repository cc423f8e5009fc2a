//! Error taxonomy for remote access.

use thiserror::Error;

/// Errors from a call against the remote management endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Endpoint unreachable or connection lost. Transient.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// The endpoint answered that the requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The endpoint answered but refused or mangled this call. Not retried.
    #[error("remote call rejected: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Only connectivity errors invalidate the current handle.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, RemoteError::Connectivity(_))
    }
}

/// Errors from the secondary payload retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("invalid retrieval token: {0}")]
    InvalidToken(String),

    #[error("payload connection failed: {0}")]
    Connect(String),

    #[error("payload fetch timed out")]
    Timeout,

    #[error("payload fetch returned status {0}")]
    Status(u16),

    #[error("payload body error: {0}")]
    Body(String),
}

/// Startup connection failure. Fatal: the process should exit.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("could not connect after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: RemoteError },
}
