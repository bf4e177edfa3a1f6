//! Network address helpers

use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use super::error::{RelayError, Result};

/// Parse a listen or upstream address
///
/// Accepts a literal `ip:port` pair first; anything else is treated as a
/// `host:port` name and resolved, taking the first address the resolver
/// returns.
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    if let Ok(parsed) = SocketAddr::from_str(addr) {
        return Ok(parsed);
    }

    addr.to_socket_addrs()
        .ok()
        .and_then(|mut resolved| resolved.next())
        .ok_or_else(|| RelayError::Config(format!("Invalid address: {}", addr)))
}
