//! Configuration management
//!
//! Settings come from the environment (optionally a .env file) or from a
//! TOML file with the same keys. Immutable once the watcher starts.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_ALGOD_URL: &str = "https://testnet-api.algonode.cloud";

/// Watcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_algod_url")]
    pub algod_url: String,
    #[serde(default)]
    pub algod_token: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Log collector stats every N cycles (0 = never)
    #[serde(default = "default_stats_log_every")]
    pub stats_log_every: u64,
}

fn default_algod_url() -> String { DEFAULT_ALGOD_URL.to_string() }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 5000 }
fn default_poll_interval() -> u64 { 60 }
fn default_fetch_timeout() -> u64 { 10 }
fn default_stats_log_every() -> u64 { 60 }

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            algod_url: default_algod_url(),
            algod_token: String::new(),
            host: default_host(),
            port: default_port(),
            poll_interval_secs: default_poll_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            stats_log_every: default_stats_log_every(),
        }
    }
}

impl WatcherConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.algod_url.trim().is_empty() {
            anyhow::bail!("algod_url must not be empty");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than zero");
        }
        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("fetch_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// `host:port` for the HTTP listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Load configuration from the environment, reading .env first if present
pub fn load_config() -> Result<WatcherConfig> {
    dotenv::dotenv().ok();
    config_from_lookup(|key| std::env::var(key).ok())
}

fn config_from_lookup<F>(lookup: F) -> Result<WatcherConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = WatcherConfig::default();

    let config = WatcherConfig {
        algod_url: lookup("ALGOD_URL").unwrap_or(defaults.algod_url),
        algod_token: lookup("ALGOD_TOKEN").unwrap_or(defaults.algod_token),
        host: lookup("WATCHER_HOST").unwrap_or(defaults.host),
        port: parse_var(&lookup, "WATCHER_PORT", defaults.port)?,
        poll_interval_secs: parse_var(&lookup, "POLL_INTERVAL_SECS", defaults.poll_interval_secs)?,
        fetch_timeout_secs: parse_var(&lookup, "FETCH_TIMEOUT_SECS", defaults.fetch_timeout_secs)?,
        stats_log_every: parse_var(&lookup, "STATS_LOG_EVERY", defaults.stats_log_every)?,
    };

    config.validate()?;
    Ok(config)
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has invalid value: {}", key, raw)),
        None => Ok(default),
    }
}
