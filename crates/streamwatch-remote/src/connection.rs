//! Connection manager — owns the current endpoint handle.
//!
//! The first connection is made lazily (or eagerly at startup with a
//! bounded number of attempts). After that the cached handle is handed
//! out until a caller reports a connectivity failure against it; the next
//! `acquire()` then reconnects. Reconnect attempts are gated by an
//! exponential backoff window so a dead endpoint is not hammered, but
//! they never stop.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::endpoint::{Connector, RemoteEndpoint};
use crate::error::{ConnectError, RemoteError};

/// A live endpoint connection, tagged with the generation it belongs to.
#[derive(Clone)]
pub struct RemoteHandle {
    generation: u64,
    endpoint: Arc<dyn RemoteEndpoint>,
}

impl std::fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl RemoteHandle {
    /// Monotonic connection counter; bumps on every reconnect.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Deref for RemoteHandle {
    type Target = dyn RemoteEndpoint;

    fn deref(&self) -> &Self::Target {
        self.endpoint.as_ref()
    }
}

/// Retry behaviour for connection attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts made by `connect_at_startup` before giving up.
    pub startup_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            startup_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Exponential backoff between steady-state reconnect attempts.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    failures: u32,
    retry_at: Option<Instant>,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
            failures: 0,
            retry_at: None,
        }
    }

    /// Record a failed attempt at `now`; returns the wait before the next one.
    fn record_failure(&mut self, now: Instant) -> Duration {
        let wait = self.current;
        self.failures += 1;
        self.retry_at = Some(now + wait);
        self.current = (self.current * 2).min(self.max);
        wait
    }

    fn record_success(&mut self) {
        self.current = self.initial;
        self.failures = 0;
        self.retry_at = None;
    }

    /// Time left in the current backoff window, if any.
    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.retry_at
            .map(|at| at.saturating_duration_since(now))
            .filter(|d| !d.is_zero())
    }
}

struct ConnState {
    current: Option<RemoteHandle>,
    generation: u64,
    backoff: Backoff,
}

/// Hands out the current endpoint handle and reconnects on demand.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
    state: Mutex<ConnState>,
}

impl ConnectionManager {
    /// Create a manager. No connection is made until first use.
    pub fn new(connector: Arc<dyn Connector>, policy: RetryPolicy) -> Self {
        let backoff = Backoff::new(policy.initial_backoff, policy.max_backoff);
        Self {
            connector,
            policy,
            state: Mutex::new(ConnState {
                current: None,
                generation: 0,
                backoff,
            }),
        }
    }

    /// Connect eagerly, failing fast after `startup_attempts` attempts.
    ///
    /// Sleeps with exponential backoff between attempts. Exhausting the
    /// attempts is a configuration error and should end the process.
    pub async fn connect_at_startup(&self) -> Result<RemoteHandle, ConnectError> {
        let mut state = self.state.lock().await;
        if let Some(handle) = &state.current {
            return Ok(handle.clone());
        }

        let mut wait = self.policy.initial_backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.connector.connect().await {
                Ok(endpoint) => {
                    state.backoff.record_success();
                    return Ok(install(&mut state, endpoint));
                }
                Err(e) => {
                    warn!(attempt, max = self.policy.startup_attempts, error = %e, "startup connection attempt failed");
                    if attempt >= self.policy.startup_attempts {
                        return Err(ConnectError::Exhausted {
                            attempts: attempt,
                            last: e,
                        });
                    }
                    tokio::time::sleep(wait).await;
                    wait = (wait * 2).min(self.policy.max_backoff);
                }
            }
        }
    }

    /// Return the cached handle, or try one reconnect.
    ///
    /// While a backoff window is open this fails immediately with a
    /// connectivity error instead of blocking the caller.
    pub async fn acquire(&self) -> Result<RemoteHandle, RemoteError> {
        let mut state = self.state.lock().await;
        if let Some(handle) = &state.current {
            return Ok(handle.clone());
        }

        let now = Instant::now();
        if let Some(remaining) = state.backoff.remaining(now) {
            return Err(RemoteError::Connectivity(format!(
                "endpoint unreachable; next reconnect in {}ms",
                remaining.as_millis()
            )));
        }

        match self.connector.connect().await {
            Ok(endpoint) => {
                if state.backoff.failures > 0 {
                    info!(failures = state.backoff.failures, "reconnected to remote endpoint");
                }
                state.backoff.record_success();
                Ok(install(&mut state, endpoint))
            }
            Err(e) => {
                let wait = state.backoff.record_failure(now);
                warn!(
                    error = %e,
                    failures = state.backoff.failures,
                    retry_in_ms = wait.as_millis() as u64,
                    "reconnect failed"
                );
                Err(e)
            }
        }
    }

    /// Report that a call through `handle` failed.
    ///
    /// Connectivity errors drop the handle so the next `acquire()`
    /// reconnects. Other errors, and reports against a handle that has
    /// already been replaced, are ignored.
    pub async fn report_failure(&self, handle: &RemoteHandle, err: &RemoteError) {
        if !err.is_connectivity() {
            return;
        }
        let mut state = self.state.lock().await;
        let is_current = state
            .current
            .as_ref()
            .is_some_and(|h| h.generation == handle.generation);
        if is_current {
            state.current = None;
            info!(generation = handle.generation, error = %err, "remote handle invalidated");
        } else {
            debug!(generation = handle.generation, "ignoring failure on stale handle");
        }
    }

    /// Whether a handle is currently cached.
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.current.is_some()
    }

    /// Consecutive failed reconnect attempts since the last success.
    pub async fn consecutive_failures(&self) -> u32 {
        self.state.lock().await.backoff.failures
    }
}

fn install(state: &mut ConnState, endpoint: Arc<dyn RemoteEndpoint>) -> RemoteHandle {
    state.generation += 1;
    let handle = RemoteHandle {
        generation: state.generation,
        endpoint,
    };
    state.current = Some(handle.clone());
    debug!(generation = state.generation, "remote handle installed");
    handle
}
