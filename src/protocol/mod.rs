//! Protocol classification module
//!
//! This module decides, from the first few bytes of a connection, whether the
//! client is starting an SSL/TLS handshake or speaking something else
//! (assumed SSH). It is signature sniffing, not protocol validation: the
//! relay never parses either protocol beyond this prefix.

mod classifier;

pub use classifier::{classify, detect, Classification, HandshakeKind, PREFIX_LEN};
