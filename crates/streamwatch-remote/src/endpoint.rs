//! Capability traits for the remote management endpoint.
//!
//! These traits are object-safe and return boxed futures so that the
//! tracker can hold `Arc<dyn RemoteEndpoint>` and tests can inject
//! scripted fakes.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use streamwatch_core::{EntityId, InstanceStatus, JobHealth, JobStatus};

use crate::error::{FetchError, RemoteError};

/// Boxed future returned by endpoint calls.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Boxed future returned by [`Connector::connect`].
pub type ConnectFuture<'a> = RemoteFuture<'a, Arc<dyn RemoteEndpoint>>;

/// Boxed future returned by [`PayloadFetcher::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Bytes, FetchError>> + Send + 'a>>;

/// One entry of the job list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub health: JobHealth,
}

/// Instance-level status as reported by the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatusReport {
    #[serde(default)]
    pub status: InstanceStatus,
    #[serde(default)]
    pub health: JobHealth,
    /// Unix epoch milliseconds.
    pub start_time: Option<u64>,
}

/// Reference to a batch payload, redeemed through a [`PayloadFetcher`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalToken(pub String);

impl fmt::Display for RetrievalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The remote management endpoint.
///
/// Every call may fail with [`RemoteError::Connectivity`] (transient) or
/// with a permanent per-call error.
pub trait RemoteEndpoint: Send + Sync {
    fn list_jobs<'a>(&'a self, domain: &'a str, instance: &'a str)
    -> RemoteFuture<'a, Vec<JobDescriptor>>;

    fn get_instance_status<'a>(
        &'a self,
        domain: &'a str,
        instance: &'a str,
    ) -> RemoteFuture<'a, InstanceStatusReport>;

    /// Request one consolidated metrics payload covering every job.
    fn snapshot_job_metrics<'a>(
        &'a self,
        domain: &'a str,
        instance: &'a str,
    ) -> RemoteFuture<'a, RetrievalToken>;

    /// Request one consolidated structural snapshot covering every job.
    fn snapshot_jobs<'a>(
        &'a self,
        domain: &'a str,
        instance: &'a str,
        depth: u32,
        include_static: bool,
    ) -> RemoteFuture<'a, RetrievalToken>;

    /// Request the instance's resource metrics.
    fn snapshot_instance_resources<'a>(
        &'a self,
        domain: &'a str,
        instance: &'a str,
    ) -> RemoteFuture<'a, RetrievalToken>;
}

/// Factory for endpoint connections. Owns whatever trust material a
/// reconnect needs.
pub trait Connector: Send + Sync {
    fn connect(&self) -> ConnectFuture<'_>;
}

/// Side channel that materializes a [`RetrievalToken`].
pub trait PayloadFetcher: Send + Sync {
    /// `host_override` replaces the host:port embedded in the token.
    fn fetch<'a>(
        &'a self,
        token: &'a RetrievalToken,
        host_override: Option<&'a str>,
    ) -> FetchFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_descriptor_defaults_missing_status() {
        let d: JobDescriptor = serde_json::from_str(r#"{"id": 7, "name": "A"}"#).unwrap();
        assert_eq!(d.id, EntityId::from(7));
        assert_eq!(d.status, JobStatus::Unknown);
        assert_eq!(d.health, JobHealth::Unknown);
    }

    #[test]
    fn instance_report_uses_camel_case() {
        let r: InstanceStatusReport =
            serde_json::from_str(r#"{"status": "running", "health": "healthy", "startTime": 1700}"#)
                .unwrap();
        assert_eq!(r.status, InstanceStatus::Running);
        assert_eq!(r.start_time, Some(1700));
    }
}
