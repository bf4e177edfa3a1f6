//! Default configuration values
//!
//! This module is the single source of truth for defaults, making it easier
//! to keep defaults consistent between serde, clap and plain construction.

use std::net::SocketAddr;
use std::str::FromStr;

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "SSH_SSL_RELAY_";

/// Default listen address as string
pub const LISTEN_STR: &str = "0.0.0.0:443";

/// Default upstream host as string
pub const UPSTREAM_HOST_STR: &str = "127.0.0.1";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default listen address
pub fn listen() -> SocketAddr {
    SocketAddr::from_str(LISTEN_STR)
        .expect("Default listen address should be valid")
}

/// Default upstream host
pub fn upstream_host() -> String {
    UPSTREAM_HOST_STR.to_string()
}

/// Default upstream SSH port
pub fn upstream_port_ssh() -> u16 {
    22
}

/// Default upstream SSL/TLS port
pub fn upstream_port_ssl() -> u16 {
    443
}

/// Default timeout for the 6-byte protocol probe, in milliseconds
pub fn probe_timeout_ms() -> u64 {
    5000
}

/// Default upstream connect timeout, in milliseconds
pub fn connect_timeout_ms() -> u64 {
    10000
}

/// Default relay buffer size per direction, in bytes
pub fn buffer_size() -> usize {
    8192
}

/// Default bound on relay buffers alive at once (two per connection)
pub fn max_buffers() -> usize {
    1024
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}
