//! Daemon assembly: config → connection → trackers → API server.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use streamwatch_core::StreamwatchConfig;
use streamwatch_remote::{ConnectionManager, HttpConnector, HttpFetcher, HttpSettings, RetryPolicy};
use streamwatch_tracker::DomainTracker;

pub fn load_config(path: &Path) -> anyhow::Result<StreamwatchConfig> {
    let config = StreamwatchConfig::from_file(path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    info!(path = %path.display(), domain = %config.domain.name, "config loaded");
    Ok(config)
}

/// The CLI value wins over `server.listen`.
pub fn listen_addr(config: &StreamwatchConfig, cli: Option<&str>) -> anyhow::Result<SocketAddr> {
    let raw = cli.unwrap_or(&config.server.listen);
    raw.parse()
        .with_context(|| format!("invalid listen address {raw:?}"))
}

/// Wired components, not yet connected or started.
pub struct Components {
    pub connection: Arc<ConnectionManager>,
    pub tracker: Arc<DomainTracker>,
}

pub fn assemble(config: &StreamwatchConfig) -> anyhow::Result<Components> {
    let timeout = config.timeout()?;
    let settings = HttpSettings {
        base_url: config.endpoint.url.trim_end_matches('/').to_string(),
        authorization: config.endpoint.authorization.clone(),
        timeout,
    };
    let policy = RetryPolicy {
        startup_attempts: config.connection.startup_attempts,
        initial_backoff: config.initial_backoff()?,
        max_backoff: config.max_backoff()?,
    };
    let connection = Arc::new(ConnectionManager::new(
        Arc::new(HttpConnector::new(settings)),
        policy,
    ));
    let fetcher = Arc::new(HttpFetcher::new(
        config.endpoint.authorization.clone(),
        timeout,
    ));
    let tracker = DomainTracker::from_config(config, connection.clone(), fetcher)?;
    Ok(Components {
        connection,
        tracker: Arc::new(tracker),
    })
}

pub async fn run(config: StreamwatchConfig, listen: SocketAddr) -> anyhow::Result<()> {
    info!(
        endpoint = %config.endpoint.url,
        domain = %config.domain.name,
        instances = config.domain.instances.len(),
        "streamwatch daemon starting"
    );

    let Components { connection, tracker } = assemble(&config)?;

    // ── Connect ────────────────────────────────────────────────

    if let Err(e) = connection.connect_at_startup().await {
        error!(endpoint = %config.endpoint.url, error = %e, "cannot reach management endpoint");
        return Err(e).context("startup connection failed");
    }
    info!(endpoint = %config.endpoint.url, "connected to management endpoint");

    // ── Refresh loops ──────────────────────────────────────────

    tracker.start().await;

    // ── API server ─────────────────────────────────────────────

    let router = streamwatch_api::build_router(tracker.clone());
    let listener = match tokio::net::TcpListener::bind(listen).await {
        Ok(l) => l,
        Err(e) => {
            error!(%listen, error = %e, "cannot bind API listener");
            tracker.stop_all().await;
            return Err(e).context("binding API listener");
        }
    };
    info!(addr = %listen, "API server starting");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracker.stop_all().await;
    served.context("API server failed")?;

    info!("streamwatch daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "cannot listen for ctrl-c; running until killed");
            std::future::pending::<()>().await;
        }
    }
}
