//! Bridge implementation
//!
//! A bridge owns one accepted client connection and the upstream connection
//! chosen for it, and relays bytes in both directions until either side
//! fails or closes. The two directions run as independent tasks; the first
//! failure on either leg tears down the whole bridge so that client and
//! upstream share the same fate.

use log::{debug, error};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::common::{BufferPool, PooledBuffer, Result};

/// Bridge lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BridgeState {
    /// Upstream classification and dial in progress
    Connecting = 0,
    /// Both pumps active
    Relaying = 1,
    /// First failure detected, teardown in progress
    Closing = 2,
    /// Both sockets closed, no pump operation pending. Terminal.
    Closed = 3,
}

impl BridgeState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BridgeState::Connecting,
            1 => BridgeState::Relaying,
            2 => BridgeState::Closing,
            _ => BridgeState::Closed,
        }
    }
}

/// Close state shared by the two pump tasks of one bridge
///
/// This is the only state mutated from more than one task, and it is scoped
/// to a single bridge. Both pumps may report failure at the same instant;
/// the compare-exchange in [`SharedState::begin_close`] guarantees exactly
/// one of them starts the teardown.
struct SharedState {
    state: AtomicU8,
    closing: CancellationToken,
}

impl SharedState {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(BridgeState::Connecting as u8),
            closing: CancellationToken::new(),
        }
    }

    fn state(&self) -> BridgeState {
        BridgeState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_relaying(&self) {
        self.state
            .store(BridgeState::Relaying as u8, Ordering::Release);
    }

    /// Move to Closing and wake both pumps. Returns true for the first
    /// caller only; every later call is a no-op.
    fn begin_close(&self) -> bool {
        let won = self
            .state
            .compare_exchange(
                BridgeState::Relaying as u8,
                BridgeState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if won {
            self.closing.cancel();
        }
        won
    }

    fn is_closing(&self) -> bool {
        self.state.load(Ordering::Acquire) >= BridgeState::Closing as u8
    }

    fn finish(&self) {
        self.state
            .store(BridgeState::Closed as u8, Ordering::Release);
    }
}

/// One client connection paired with its upstream connection
pub struct Bridge {
    downstream: TcpStream,
    upstream: TcpStream,
    peer: SocketAddr,
    shared: Arc<SharedState>,
}

impl Bridge {
    /// Create a bridge for an already-connected pair of sockets
    ///
    /// The probe bytes must already have been forwarded to the upstream by
    /// the acceptor; the bridge relays everything from here on verbatim.
    pub fn new(downstream: TcpStream, upstream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            downstream,
            upstream,
            peer,
            shared: Arc::new(SharedState::new()),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> BridgeState {
        self.shared.state()
    }

    /// Relay both directions until either side fails or closes
    ///
    /// Returns once both sockets are closed and neither direction has a
    /// pending operation. Each direction borrows one buffer from the pool
    /// for its whole lifetime.
    pub async fn run(self, pool: &BufferPool) -> Result<()> {
        let (downstream_buf, upstream_buf) = pool.get_buffer_pair().await;

        self.shared.set_relaying();
        debug!("relaying for {} started", self.peer);

        let (downstream_read, downstream_write) = self.downstream.into_split();
        let (upstream_read, upstream_write) = self.upstream.into_split();

        let client_to_upstream = tokio::spawn(pump(
            downstream_read,
            upstream_write,
            downstream_buf,
            Arc::clone(&self.shared),
            "downstream -> upstream",
        ));
        let upstream_to_client = tokio::spawn(pump(
            upstream_read,
            downstream_write,
            upstream_buf,
            Arc::clone(&self.shared),
            "upstream -> downstream",
        ));

        let (first, second) = tokio::join!(client_to_upstream, upstream_to_client);
        for result in [first, second] {
            if let Err(e) = result {
                error!("relay task for {} failed: {}", self.peer, e);
            }
        }

        self.shared.finish();
        debug!("bridge for {} closed", self.peer);

        Ok(())
    }
}

/// One direction's forwarding loop
///
/// Reads up to one buffer from `src`, writes exactly those bytes to `dst`,
/// then reads again. At most one read and one write are outstanding at any
/// time, so a slow destination delays the next read and memory stays bounded
/// to one buffer per direction. Any error, or a zero-length read, initiates
/// the bridge-wide close; the pump then shuts down the write half it owns
/// and exits. Both the pending read and a pending write are abandoned when
/// the other direction signals close, so a peer that stops reading cannot
/// keep a dying bridge alive.
async fn pump(
    mut src: OwnedReadHalf,
    mut dst: OwnedWriteHalf,
    mut buf: PooledBuffer,
    shared: Arc<SharedState>,
    direction: &'static str,
) {
    let mut total_bytes: u64 = 0;

    loop {
        let n = tokio::select! {
            biased;
            _ = shared.closing.cancelled() => break,
            read = src.read(&mut buf.buffer[..]) => match read {
                Ok(0) => {
                    debug!("{} closed by peer", direction);
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    debug!("{} read error: {}", direction, e);
                    break;
                }
            },
        };

        // The other direction may have failed while the read was in flight.
        if shared.is_closing() {
            break;
        }

        // A write to a stalled peer must not outlive the bridge; abandon it
        // once the other leg has failed.
        let write = tokio::select! {
            biased;
            _ = shared.closing.cancelled() => break,
            result = dst.write_all(&buf.buffer[..n]) => result,
        };
        if let Err(e) = write {
            debug!("{} write error: {}", direction, e);
            break;
        }
        total_bytes += n as u64;
    }

    shared.begin_close();
    let _ = dst.shutdown().await;

    debug!("{} transferred {} bytes total", direction, total_bytes);
}
