// crates/tracking-client/src/config.rs

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracking_core::DriverId;

use crate::error::{Result, TrackingError};

/// Configuration for the tracking client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_addr: String,

    /// Reconnect attempts after the first failure, per connect cycle.
    pub reconnection_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub reconnect_delay_max_ms: u64,

    /// Per-attempt connect timeout.
    pub connect_timeout_ms: u64,

    /// Cap on how long a point query waits for its acknowledgement.
    pub query_timeout_ms: u64,

    /// How long a tracker waits for a first connection before reporting an error.
    pub bootstrap_timeout_ms: u64,

    /// `0` disables the heartbeat.
    pub heartbeat_interval_secs: u64,

    /// Display labels keyed by driver id, for rendering only.
    pub labels: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:9000".to_string(),
            reconnection_attempts: 5,
            reconnect_delay_ms: 1000,
            reconnect_delay_max_ms: 5000,
            connect_timeout_ms: 20_000,
            query_timeout_ms: 10_000,
            bootstrap_timeout_ms: 5000,
            heartbeat_interval_secs: 25,
            labels: HashMap::new(),
        }
    }
}

impl ClientConfig {
    /// Load from a TOML file; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TrackingError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| TrackingError::Config(e.to_string()))
    }

    /// Delay before reconnect attempt `attempt` (1-based): linear, capped.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let linear = self.reconnect_delay_ms.saturating_mul(attempt.max(1) as u64);
        Duration::from_millis(linear.min(self.reconnect_delay_max_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_millis(self.bootstrap_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        match self.heartbeat_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Label lookup over the `[labels]` table. Entries whose key is not a
    /// driver id are ignored.
    pub fn label_lookup(&self) -> impl Fn(DriverId) -> Option<String> {
        let labels: HashMap<DriverId, String> = self
            .labels
            .iter()
            .filter_map(|(k, v)| k.parse::<DriverId>().ok().map(|id| (id, v.clone())))
            .collect();
        move |id| labels.get(&id).cloned()
    }
}
