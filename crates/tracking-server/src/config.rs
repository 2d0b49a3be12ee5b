//! Configuration for the tracking relay.
//!
//! Defaults can be overridden through environment variables:
//!
//! - `TRACKING_BIND_ADDR`           (default: "0.0.0.0")
//! - `TRACKING_PORT`                (default: "9000")
//! - `TRACKING_MAX_CLIENTS`         (default: "1024")
//! - `TRACKING_STATS_INTERVAL_SECS` (default: "10", 0 disables)

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Maximum number of simultaneously connected clients.
    pub max_clients: usize,

    /// Period of the `stats` broadcast. `None` disables it.
    pub stats_interval: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: 9000,
            max_clients: 1024,
            stats_interval: Some(Duration::from_secs(10)),
        }
    }
}

impl Config {
    /// Build a `Config` from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();
        let bind_addr = env::var("TRACKING_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let port = read_env_or_default("TRACKING_PORT", defaults.port)?;
        let max_clients = read_env_or_default("TRACKING_MAX_CLIENTS", defaults.max_clients)?;
        let stats_secs = read_env_or_default("TRACKING_STATS_INTERVAL_SECS", 10u64)?;

        Ok(Config {
            bind_addr,
            port,
            max_clients,
            stats_interval: (stats_secs > 0).then(|| Duration::from_secs(stats_secs)),
        })
    }

    /// `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn read_env_or_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid {}={:?}", key, val)),
        Err(_) => Ok(default),
    }
}
