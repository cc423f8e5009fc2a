//! streamwatch-remote — access to the remote management endpoint.
//!
//! The endpoint is an opaque capability behind the [`RemoteEndpoint`]
//! trait. A [`Connector`] produces endpoints; the [`ConnectionManager`]
//! caches the current one and reconnects with backoff when a caller
//! reports a connectivity failure. Batch payloads are materialized
//! through a separate [`PayloadFetcher`] side channel.
//!
//! # Architecture
//!
//! ```text
//! ConnectionManager
//!   ├── Connector::connect() → Arc<dyn RemoteEndpoint>
//!   ├── acquire() → RemoteHandle (cached until invalidated)
//!   └── report_failure() → drops the handle on connectivity errors
//!
//! RemoteEndpoint (list_jobs, get_instance_status, snapshot_*)
//!   └── snapshot_* → RetrievalToken ──► PayloadFetcher::fetch() → Bytes
//! ```
//!
//! `http` holds hyper-based implementations of all three traits.

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod fetch;
pub mod http;

pub use connection::{ConnectionManager, RemoteHandle, RetryPolicy};
pub use endpoint::{
    ConnectFuture, Connector, FetchFuture, InstanceStatusReport, JobDescriptor, PayloadFetcher,
    RemoteEndpoint, RemoteFuture, RetrievalToken,
};
pub use error::{ConnectError, FetchError, RemoteError};
pub use fetch::HttpFetcher;
pub use http::{HttpConnector, HttpEndpoint, HttpSettings};
