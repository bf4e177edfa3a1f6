//! SSH/SSL Relay: one listening port, two upstream services
//!
//! This library implements a transparent TCP relay that inspects the first
//! bytes of each inbound connection to decide, without any explicit client
//! signal, whether the client is starting an SSL/TLS handshake or speaking
//! something else (assumed SSH), and forwards the connection to the matching
//! upstream port. A single externally visible address can thereby serve an
//! SSH daemon and a TLS service that historically share a port.
//!
//! The relay is byte-transparent: it neither terminates TLS nor validates
//! either protocol beyond the 6-byte prefix it sniffs, and those 6 bytes are
//! replayed to the upstream before any relaying starts.
//!
//! # Example
//!
//! ```no_run
//! use ssh_ssl_relay::config::RelayConfig;
//! use ssh_ssl_relay::relay::Acceptor;
//! use ssh_ssl_relay::Result;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Arc::new(RelayConfig::default());
//!
//!     let acceptor = Acceptor::bind(config).await?;
//!     let shutdown = CancellationToken::new();
//!
//!     acceptor.run(shutdown).await
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod protocol;
pub mod relay;

// Re-export commonly used structures and functions for convenience
pub use common::{parse_socket_addr, RelayError, Result};
pub use protocol::{classify, Classification};
pub use relay::{Acceptor, Bridge};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
