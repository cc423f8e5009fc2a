//! streamwatch.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamwatchConfig {
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    pub domain: DomainConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL of the management REST endpoint.
    pub url: String,
    /// Raw `Authorization` header value sent on every call,
    /// e.g. `Basic YWRtaW46c2VjcmV0`.
    pub authorization: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Replaces the host:port of retrieval URIs handed out by the endpoint.
    pub payload_host_override: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub startup_attempts: u32,
    pub initial_backoff: String,
    pub max_backoff: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            startup_attempts: 5,
            initial_backoff: "1s".to_string(),
            max_backoff: "60s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    pub instances: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    #[default]
    Periodic,
    OnDemand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub mode: RefreshMode,
    pub interval: String,
    pub fetch_retries: u32,
    pub snapshot_depth: u32,
    pub include_static: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            mode: RefreshMode::Periodic,
            interval: "10s".to_string(),
            fetch_retries: 1,
            snapshot_depth: 1,
            include_static: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:25500".to_string(),
        }
    }
}

fn default_timeout() -> String {
    "10s".to_string()
}

impl StreamwatchConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: StreamwatchConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that would otherwise fail later at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.url.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint.url is empty".into()));
        }
        if self.domain.name.trim().is_empty() {
            return Err(ConfigError::Invalid("domain.name is empty".into()));
        }
        if self.domain.instances.is_empty() {
            return Err(ConfigError::Invalid("domain.instances is empty".into()));
        }
        let mut names = self.domain.instances.clone();
        names.sort();
        names.dedup();
        if names.len() != self.domain.instances.len() {
            return Err(ConfigError::Invalid("domain.instances has duplicates".into()));
        }
        if self.connection.startup_attempts == 0 {
            return Err(ConfigError::Invalid(
                "connection.startup_attempts must be at least 1".into(),
            ));
        }
        self.timeout()?;
        self.initial_backoff()?;
        self.max_backoff()?;
        self.refresh_interval()?;
        Ok(())
    }

    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        duration_field("endpoint.timeout", &self.endpoint.timeout)
    }

    pub fn initial_backoff(&self) -> Result<Duration, ConfigError> {
        duration_field("connection.initial_backoff", &self.connection.initial_backoff)
    }

    pub fn max_backoff(&self) -> Result<Duration, ConfigError> {
        duration_field("connection.max_backoff", &self.connection.max_backoff)
    }

    pub fn refresh_interval(&self) -> Result<Duration, ConfigError> {
        duration_field("refresh.interval", &self.refresh.interval)
    }
}

fn duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(ConfigError::Duration {
            field,
            value: value.to_string(),
        }),
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
