//! Shared types used across streamwatch crates.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ParseIdError;

// ── Identifiers ────────────────────────────────────────────────────

/// Numeric job identifier of arbitrary precision.
///
/// Stored as the canonical decimal string (no leading zeros), which keeps
/// ids beyond `u64` intact. Ordering is numeric: a shorter canonical string
/// is always the smaller number, equal lengths compare lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityId(String);

impl EntityId {
    /// The canonical decimal digits.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for EntityId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseIdError(s.to_string()));
        }
        let canonical = trimmed.trim_start_matches('0');
        let canonical = if canonical.is_empty() { "0" } else { canonical };
        Ok(Self(canonical.to_string()))
    }
}

impl From<u64> for EntityId {
    fn from(v: u64) -> Self {
        Self(v.to_string())
    }
}

impl Ord for EntityId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for EntityId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // The endpoint reports ids either as strings or as plain numbers.
        // A JSON number past u64 arrives as a float with its digits already
        // rounded away, so only the string form carries such ids intact.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
            Inexact(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(EntityId::from(n)),
            Raw::Inexact(n) => Err(serde::de::Error::custom(format!(
                "numeric id {n} is not a u64; ids beyond u64 must be sent as strings"
            ))),
        }
    }
}

// ── Status enums ───────────────────────────────────────────────────

/// Lifecycle status of a job as reported by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[serde(alias = "Running")]
    Running,
    #[serde(alias = "Stopping", alias = "canceling")]
    Stopping,
    #[serde(alias = "Stopped", alias = "canceled")]
    Stopped,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Aggregate health of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobHealth {
    #[serde(alias = "Healthy")]
    Healthy,
    #[serde(alias = "partiallyHealthy", alias = "partiallyUnhealthy")]
    Partial,
    #[serde(alias = "Unhealthy")]
    Unhealthy,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Lifecycle status of an instance as reported by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    #[serde(alias = "Starting")]
    Starting,
    #[serde(alias = "Running")]
    Running,
    #[serde(alias = "Stopping")]
    Stopping,
    #[serde(alias = "Stopped")]
    Stopped,
    #[serde(alias = "Failed")]
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Availability state of a tracked instance.
///
/// `Available` and `Unavailable` oscillate for the life of the process;
/// there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    #[default]
    Uninitialized,
    Initializing,
    Available,
    Unavailable,
}

impl TrackerState {
    pub fn is_available(self) -> bool {
        self == TrackerState::Available
    }
}

// ── Freshness ──────────────────────────────────────────────────────

/// Freshness triple attached to every cached payload.
///
/// Timestamps are Unix epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Freshness {
    /// Time of the last successful refresh.
    pub last_refresh: Option<u64>,
    /// Time of the last failed refresh.
    pub last_failure: Option<u64>,
    /// Whether the most recent refresh attempt failed.
    pub failed: bool,
}

impl Freshness {
    /// Record a successful refresh at `now`.
    pub fn succeeded(self, now: u64) -> Self {
        Self {
            last_refresh: Some(now),
            last_failure: self.last_failure,
            failed: false,
        }
    }

    /// Record a failed refresh at `now`. The success timestamp is kept.
    pub fn failed(self, now: u64) -> Self {
        Self {
            last_refresh: self.last_refresh,
            last_failure: Some(now),
            failed: true,
        }
    }

    /// True when the cached value is not from the latest attempt.
    pub fn is_stale(&self) -> bool {
        self.failed || self.last_refresh.is_none()
    }
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
