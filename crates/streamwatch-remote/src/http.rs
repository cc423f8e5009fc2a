//! hyper-based endpoint and connector.
//!
//! The management endpoint is reached over HTTP/1.1 with JSON bodies.
//! Paths are relative to the configured base URL:
//!
//! | Method | Path | Result |
//! |---|---|---|
//! | GET | `/domains/{d}/instances/{i}` | `InstanceStatusReport` |
//! | GET | `/domains/{d}/instances/{i}/jobs` | `{"jobs": [JobDescriptor]}` |
//! | POST | `/domains/{d}/instances/{i}/snapshots/jobmetrics` | `{"uri": token}` |
//! | POST | `/domains/{d}/instances/{i}/snapshots/jobs?depth=N&includeStatic=B` | `{"uri": token}` |
//! | POST | `/domains/{d}/instances/{i}/snapshots/resources` | `{"uri": token}` |
//!
//! TLS is terminated in front of streamwatch; only `http` URIs are dialed.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, HOST, USER_AGENT};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Empty};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::endpoint::{
    ConnectFuture, Connector, InstanceStatusReport, JobDescriptor, RemoteEndpoint, RemoteFuture,
    RetrievalToken,
};
use crate::error::RemoteError;

/// Connection settings shared by the connector and every endpoint it creates.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub base_url: String,
    /// Full `Authorization` header value, e.g. `Basic dXNlcjpwYXNz`.
    pub authorization: Option<String>,
    pub timeout: Duration,
}

/// Transport-level failure of a single HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HttpFailure {
    /// Bad URI or request; nothing was sent.
    Request(String),
    Connect(String),
    Timeout,
    Body(String),
}

/// Perform one HTTP/1.1 exchange on a fresh connection.
pub(crate) async fn http_request(
    method: Method,
    uri: &Uri,
    authorization: Option<&str>,
    timeout: Duration,
) -> Result<(StatusCode, Bytes), HttpFailure> {
    if uri.scheme_str() != Some("http") {
        return Err(HttpFailure::Request(format!("unsupported uri scheme: {uri}")));
    }
    let authority = uri
        .authority()
        .ok_or_else(|| HttpFailure::Request(format!("uri has no host: {uri}")))?
        .clone();
    let address = match authority.port_u16() {
        Some(_) => authority.to_string(),
        None => format!("{}:80", authority.host()),
    };
    let path = uri
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let exchange = async {
        let stream = tokio::net::TcpStream::connect(&address)
            .await
            .map_err(|e| HttpFailure::Connect(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| HttpFailure::Connect(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "http connection ended with error");
            }
        });

        let mut builder = Request::builder()
            .method(method)
            .uri(path.as_str())
            .header(HOST, authority.as_str())
            .header(USER_AGENT, "streamwatch/0.1")
            .header(ACCEPT, "application/json");
        if let Some(auth) = authorization {
            builder = builder.header(AUTHORIZATION, auth);
        }
        let req = builder
            .body(Empty::<Bytes>::new())
            .map_err(|e| HttpFailure::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| HttpFailure::Connect(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| HttpFailure::Body(e.to_string()))?
            .to_bytes();
        Ok((status, body))
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => {
            debug!(%uri, "http request timed out");
            Err(HttpFailure::Timeout)
        }
    }
}

/// Percent-encode one path segment (RFC 3986 unreserved set kept as-is).
pub(crate) fn encode_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn remote_failure(failure: HttpFailure) -> RemoteError {
    match failure {
        HttpFailure::Request(msg) => RemoteError::Rejected(msg),
        HttpFailure::Connect(msg) => RemoteError::Connectivity(msg),
        HttpFailure::Timeout => RemoteError::Connectivity("request timed out".into()),
        HttpFailure::Body(msg) => RemoteError::Connectivity(format!("response body: {msg}")),
    }
}

#[derive(Deserialize)]
struct JobList {
    #[serde(default)]
    jobs: Vec<JobDescriptor>,
}

#[derive(Deserialize)]
struct TokenResponse {
    uri: String,
}

/// Endpoint implementation speaking JSON over HTTP.
pub struct HttpEndpoint {
    settings: Arc<HttpSettings>,
}

impl HttpEndpoint {
    pub fn new(settings: Arc<HttpSettings>) -> Self {
        Self { settings }
    }

    fn instance_url(&self, domain: &str, instance: &str) -> String {
        format!(
            "{}/domains/{}/instances/{}",
            self.settings.base_url.trim_end_matches('/'),
            encode_segment(domain),
            encode_segment(instance)
        )
    }

    async fn call<T: DeserializeOwned>(&self, method: Method, url: String) -> Result<T, RemoteError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| RemoteError::Rejected(format!("invalid url {url}: {e}")))?;
        let (status, body) = http_request(
            method,
            &uri,
            self.settings.authorization.as_deref(),
            self.settings.timeout,
        )
        .await
        .map_err(remote_failure)?;

        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(uri.path().to_string()));
        }
        if !status.is_success() {
            return Err(RemoteError::Rejected(format!("{status} from {}", uri.path())));
        }
        serde_json::from_slice(&body)
            .map_err(|e| RemoteError::Rejected(format!("malformed response from {}: {e}", uri.path())))
    }

    async fn token(&self, url: String) -> Result<RetrievalToken, RemoteError> {
        let resp: TokenResponse = self.call(Method::POST, url).await?;
        Ok(RetrievalToken(resp.uri))
    }
}

impl RemoteEndpoint for HttpEndpoint {
    fn list_jobs<'a>(
        &'a self,
        domain: &'a str,
        instance: &'a str,
    ) -> RemoteFuture<'a, Vec<JobDescriptor>> {
        Box::pin(async move {
            let url = format!("{}/jobs", self.instance_url(domain, instance));
            let list: JobList = self.call(Method::GET, url).await?;
            Ok(list.jobs)
        })
    }

    fn get_instance_status<'a>(
        &'a self,
        domain: &'a str,
        instance: &'a str,
    ) -> RemoteFuture<'a, InstanceStatusReport> {
        Box::pin(async move { self.call(Method::GET, self.instance_url(domain, instance)).await })
    }

    fn snapshot_job_metrics<'a>(
        &'a self,
        domain: &'a str,
        instance: &'a str,
    ) -> RemoteFuture<'a, RetrievalToken> {
        Box::pin(async move {
            let url = format!("{}/snapshots/jobmetrics", self.instance_url(domain, instance));
            self.token(url).await
        })
    }

    fn snapshot_jobs<'a>(
        &'a self,
        domain: &'a str,
        instance: &'a str,
        depth: u32,
        include_static: bool,
    ) -> RemoteFuture<'a, RetrievalToken> {
        Box::pin(async move {
            let url = format!(
                "{}/snapshots/jobs?depth={depth}&includeStatic={include_static}",
                self.instance_url(domain, instance)
            );
            self.token(url).await
        })
    }

    fn snapshot_instance_resources<'a>(
        &'a self,
        domain: &'a str,
        instance: &'a str,
    ) -> RemoteFuture<'a, RetrievalToken> {
        Box::pin(async move {
            let url = format!("{}/snapshots/resources", self.instance_url(domain, instance));
            self.token(url).await
        })
    }
}

/// Connector that checks the base URL answers before handing out an endpoint.
pub struct HttpConnector {
    settings: Arc<HttpSettings>,
}

impl HttpConnector {
    pub fn new(settings: HttpSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

impl Connector for HttpConnector {
    fn connect(&self) -> ConnectFuture<'_> {
        Box::pin(async move {
            let uri: Uri = self
                .settings
                .base_url
                .parse()
                .map_err(|e| RemoteError::Rejected(format!("invalid base url: {e}")))?;
            let (status, _) = http_request(
                Method::GET,
                &uri,
                self.settings.authorization.as_deref(),
                self.settings.timeout,
            )
            .await
            .map_err(remote_failure)?;

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(RemoteError::Rejected(format!("authentication failed: {status}")));
            }
            if status.is_server_error() {
                return Err(RemoteError::Connectivity(format!("endpoint answered {status}")));
            }
            debug!(base_url = %self.settings.base_url, %status, "remote endpoint reachable");
            Ok(Arc::new(HttpEndpoint::new(self.settings.clone())) as Arc<dyn RemoteEndpoint>)
        })
    }
}
