//! HTTP side channel that redeems retrieval tokens.

use std::time::Duration;

use bytes::Bytes;
use http::uri::{Authority, Uri};
use http::Method;
use tracing::debug;

use crate::endpoint::{FetchFuture, PayloadFetcher, RetrievalToken};
use crate::error::FetchError;
use crate::http::{HttpFailure, http_request};

/// Fetches payloads with a plain GET on the token URI.
pub struct HttpFetcher {
    authorization: Option<String>,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(authorization: Option<String>, timeout: Duration) -> Self {
        Self {
            authorization,
            timeout,
        }
    }

    async fn get(&self, token: &RetrievalToken, host_override: Option<&str>) -> Result<Bytes, FetchError> {
        let uri = resolve_uri(token, host_override)?;
        debug!(%uri, "fetching payload");

        let (status, body) = http_request(Method::GET, &uri, self.authorization.as_deref(), self.timeout)
            .await
            .map_err(|failure| match failure {
                HttpFailure::Request(msg) => FetchError::InvalidToken(msg),
                HttpFailure::Connect(msg) => FetchError::Connect(msg),
                HttpFailure::Timeout => FetchError::Timeout,
                HttpFailure::Body(msg) => FetchError::Body(msg),
            })?;

        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(body)
    }
}

impl PayloadFetcher for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        token: &'a RetrievalToken,
        host_override: Option<&'a str>,
    ) -> FetchFuture<'a> {
        Box::pin(self.get(token, host_override))
    }
}

/// Parse the token and swap in `host_override` as the authority if given.
fn resolve_uri(token: &RetrievalToken, host_override: Option<&str>) -> Result<Uri, FetchError> {
    let uri: Uri = token
        .0
        .parse()
        .map_err(|e| FetchError::InvalidToken(format!("{token}: {e}")))?;
    let Some(host) = host_override else {
        return Ok(uri);
    };

    let authority: Authority = host
        .parse()
        .map_err(|e| FetchError::InvalidToken(format!("bad host override {host}: {e}")))?;
    let mut parts = uri.into_parts();
    parts.authority = Some(authority);
    if parts.scheme.is_none() {
        parts.scheme = Some(http::uri::Scheme::HTTP);
    }
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(http::uri::PathAndQuery::from_static("/"));
    }
    Uri::from_parts(parts).map_err(|e| FetchError::InvalidToken(e.to_string()))
}
