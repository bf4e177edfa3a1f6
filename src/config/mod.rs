//! Configuration module
//!
//! This module defines the relay configuration structure and the methods for
//! loading it from its different sources (built-in defaults, a JSON
//! configuration file, environment variables, and command-line arguments).
//! Later sources override earlier ones.

pub mod defaults;

pub use defaults::ENV_PREFIX;

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::common::{parse_socket_addr, RelayError, Result};

/// Relay configuration
///
/// Contains everything the acceptor needs: where to listen, the single
/// upstream host, the two candidate upstream ports, and the relay tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct RelayConfig {
    /// Listen address for the relay
    #[serde(default = "defaults::listen")]
    pub listen: SocketAddr,

    /// Upstream host shared by both backend services
    #[serde(default = "defaults::upstream_host")]
    pub upstream_host: String,

    /// Upstream port for connections classified as SSH (or anything non-TLS)
    #[serde(default = "defaults::upstream_port_ssh")]
    pub upstream_port_ssh: u16,

    /// Upstream port for connections classified as SSL/TLS
    #[serde(default = "defaults::upstream_port_ssl")]
    pub upstream_port_ssl: u16,

    /// How long a client may take to send the 6 probe bytes, in milliseconds
    #[serde(default = "defaults::probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Upstream connect timeout, in milliseconds
    #[serde(default = "defaults::connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Relay buffer size per direction, in bytes
    #[serde(default = "defaults::buffer_size")]
    pub buffer_size: usize,

    /// Bound on relay buffers alive at once; two are used per connection
    #[serde(default = "defaults::max_buffers")]
    pub max_buffers: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            upstream_host: defaults::upstream_host(),
            upstream_port_ssh: defaults::upstream_port_ssh(),
            upstream_port_ssl: defaults::upstream_port_ssl(),
            probe_timeout_ms: defaults::probe_timeout_ms(),
            connect_timeout_ms: defaults::connect_timeout_ms(),
            buffer_size: defaults::buffer_size(),
            max_buffers: defaults::max_buffers(),
            log_level: defaults::log_level(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults; unknown fields are
    /// rejected.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!(
                "Failed to read configuration file {}: {}", path.display(), e
            )))?;

        let config: RelayConfig = serde_json::from_str(&content)
            .map_err(|e| RelayError::Config(format!(
                "Failed to parse configuration file {}: {}", path.display(), e
            )))?;

        Ok(config)
    }

    /// Apply overrides from `SSH_SSL_RELAY_*` environment variables
    ///
    /// Recognized variables: LISTEN, UPSTREAM_HOST, UPSTREAM_PORT_SSH,
    /// UPSTREAM_PORT_SSL, PROBE_TIMEOUT_MS, CONNECT_TIMEOUT_MS, BUFFER_SIZE,
    /// MAX_BUFFERS, LOG_LEVEL.
    pub fn apply_env(&mut self) -> Result<()> {
        let get_env = |name: &str| -> Option<String> {
            env::var(format!("{}{}", ENV_PREFIX, name)).ok()
        };

        if let Some(listen) = get_env("LISTEN") {
            self.listen = parse_socket_addr(&listen)?;
        }

        if let Some(host) = get_env("UPSTREAM_HOST") {
            self.upstream_host = host;
        }

        if let Some(port) = get_env("UPSTREAM_PORT_SSH") {
            self.upstream_port_ssh = parse_env_number(&port, "UPSTREAM_PORT_SSH")?;
        }

        if let Some(port) = get_env("UPSTREAM_PORT_SSL") {
            self.upstream_port_ssl = parse_env_number(&port, "UPSTREAM_PORT_SSL")?;
        }

        if let Some(timeout) = get_env("PROBE_TIMEOUT_MS") {
            self.probe_timeout_ms = parse_env_number(&timeout, "PROBE_TIMEOUT_MS")?;
        }

        if let Some(timeout) = get_env("CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = parse_env_number(&timeout, "CONNECT_TIMEOUT_MS")?;
        }

        if let Some(size) = get_env("BUFFER_SIZE") {
            self.buffer_size = parse_env_number(&size, "BUFFER_SIZE")?;
        }

        if let Some(max) = get_env("MAX_BUFFERS") {
            self.max_buffers = parse_env_number(&max, "MAX_BUFFERS")?;
        }

        if let Some(level) = get_env("LOG_LEVEL") {
            self.log_level = level;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.upstream_host.is_empty() {
            return Err(RelayError::Config("Upstream host must not be empty".to_string()));
        }

        if self.buffer_size == 0 {
            return Err(RelayError::Config("Buffer size must be greater than zero".to_string()));
        }

        if self.max_buffers < 2 {
            return Err(RelayError::Config(
                "At least two buffers are required to relay a single connection".to_string(),
            ));
        }

        if self.probe_timeout_ms == 0 {
            return Err(RelayError::Config("Probe timeout must be greater than zero".to_string()));
        }

        Ok(())
    }

    /// Timeout for the 6-byte protocol probe
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Timeout for dialing the upstream
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn parse_env_number<T: std::str::FromStr>(value: &str, name: &str) -> Result<T> {
    value.parse().map_err(|_| RelayError::Config(format!(
        "Invalid value for {}{}: {}", ENV_PREFIX, name, value
    )))
}
