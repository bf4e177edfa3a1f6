//! Relay module
//!
//! This module implements the core of the relay: the accept loop that sniffs
//! and dispatches new connections, and the bridge that pumps bytes between
//! an accepted client and its chosen upstream until either side goes away.

pub mod acceptor;
mod bridge;

pub use acceptor::Acceptor;
pub use bridge::{Bridge, BridgeState};
