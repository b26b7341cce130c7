//! Configuration for stashkv
//!
//! Centralized configuration with sensible defaults.

use crate::storage::{ExpiryConfig, FlushConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a stashkv server
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Backing snapshot file
    pub data_file: PathBuf,

    /// How often the index is written to the backing file
    pub flush_interval: Duration,

    /// How often expired entries are swept
    pub sweep_interval: Duration,

    // -------------------------------------------------------------------------
    // Request Defaults
    // -------------------------------------------------------------------------
    /// Lifetime given to entries added without a TTL
    pub default_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            data_file: PathBuf::from("data.json"),
            flush_interval: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
            default_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn expiry(&self) -> ExpiryConfig {
        ExpiryConfig {
            interval: self.sweep_interval,
        }
    }

    pub fn flush(&self) -> FlushConfig {
        FlushConfig {
            interval: self.flush_interval,
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the backing snapshot file
    pub fn data_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_file = path.into();
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Set the lifetime of entries added without a TTL
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl = ttl;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
