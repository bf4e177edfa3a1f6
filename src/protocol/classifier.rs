//! Protocol classifier implementation
//!
//! This module classifies a connection from the first few bytes it sends,
//! the way sslh, NGINX and HAProxy sniff protocols: signature matching on the
//! record prefix, not protocol validation. A connection is either the start
//! of an SSL/TLS handshake or it is assumed to be SSH (or any other
//! plaintext protocol) and routed accordingly.

use std::fmt;

/// Number of bytes read from a new connection before classifying it
pub const PREFIX_LEN: usize = 6;

/// Routing decision derived from the prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// An SSLv2, SSLv3 or TLS 1.x handshake
    TlsOrSsl,
    /// Anything else, assumed SSH
    Other,
}

/// Which handshake flavor the prefix looked like
///
/// Only used for logging; routing depends solely on the two-way
/// [`Classification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeKind {
    /// SSLv2 record with a client-hello message type
    Sslv2,
    /// SSLv3 handshake record
    Sslv3,
    /// TLS 1.x handshake record
    Tls1x,
    /// SSH or any other non-TLS protocol
    Other,
}

impl HandshakeKind {
    /// Map the handshake flavor to a routing decision
    pub fn classification(self) -> Classification {
        match self {
            HandshakeKind::Sslv2 | HandshakeKind::Sslv3 | HandshakeKind::Tls1x => {
                Classification::TlsOrSsl
            }
            HandshakeKind::Other => Classification::Other,
        }
    }
}

impl fmt::Display for HandshakeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeKind::Sslv2 => write!(f, "SSL v2.0 handshake"),
            HandshakeKind::Sslv3 => write!(f, "SSL v3.0 handshake"),
            HandshakeKind::Tls1x => write!(f, "TLS v1.x handshake"),
            HandshakeKind::Other => write!(f, "SSH or something else"),
        }
    }
}

/// Classify a connection prefix
///
/// Pure and total; the routing decision for real clients depends on these
/// rules being applied exactly as written, in order, first match wins.
pub fn classify(prefix: &[u8; PREFIX_LEN]) -> Classification {
    detect(prefix).classification()
}

/// Detect the handshake flavor of a connection prefix
///
/// SSLv2 records carry the record length in the first two bytes with the
/// high bit set; a client hello is longer than 9 bytes and has message type
/// 0x01. SSLv3/TLS handshake records start with content type 0x16 and major
/// version 3. Everything that matches neither signature is routed as SSH.
pub fn detect(prefix: &[u8; PREFIX_LEN]) -> HandshakeKind {
    if prefix[0] & 0x80 != 0 {
        // SSLv2 maybe
        let length = ((usize::from(prefix[0] & 0x7f)) << 8) + usize::from(prefix[1]);
        if length > 9 && prefix[2] == 0x01 {
            return HandshakeKind::Sslv2;
        }
    } else if prefix[0] == 0x16 && prefix[1] == 3 {
        // prefix[2] distinguishes SSLv3 from TLS 1.x, but both route the same
        if prefix[2] != 0 {
            return HandshakeKind::Tls1x;
        }
        return HandshakeKind::Sslv3;
    }

    HandshakeKind::Other
}
