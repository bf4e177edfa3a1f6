//! Acceptor implementation
//!
//! The acceptor owns the listening socket. Every accepted connection gets its
//! own task for the whole {probe read, classify, dial, relay} sequence, so a
//! client that stalls during the probe can never hold up the accept loop.

use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::common::{BufferPool, RelayError, Result};
use crate::config::RelayConfig;
use crate::protocol::{self, Classification, PREFIX_LEN};

use super::bridge::Bridge;

/// Accept loop for the relay
///
/// Binds the configured listen address and, per connection, sniffs the
/// protocol prefix, dials the matching upstream port and runs a bridge.
pub struct Acceptor {
    listener: TcpListener,
    config: Arc<RelayConfig>,
    pool: BufferPool,
}

impl Acceptor {
    /// Bind the listen address
    ///
    /// A bind failure (address in use, permission denied) is fatal; the
    /// relay cannot run without its listener.
    pub async fn bind(config: Arc<RelayConfig>) -> Result<Self> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(RelayError::Io)?;

        let pool = BufferPool::new(config.max_buffers, config.buffer_size);

        Ok(Self {
            listener,
            config,
            pool,
        })
    }

    /// Address the acceptor is actually listening on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(RelayError::Io)
    }

    /// Accept connections until the token is cancelled
    ///
    /// Failures on individual connections are logged and never stop the
    /// loop. On cancellation the loop stops accepting and in-flight bridges
    /// are aborted (immediate close, no drain).
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(
            "Relay started, listening on {}, forwarding to {} (ssh {}, ssl {})",
            self.local_addr()?,
            self.config.upstream_host,
            self.config.upstream_port_ssh,
            self.config.upstream_port_ssl,
        );

        let mut tasks = JoinSet::new();

        loop {
            // Reap finished connection tasks and surface panics
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    if !e.is_cancelled() {
                        error!("Connection task failed: {}", e);
                    }
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((downstream, peer)) => {
                        info!("Accepted connection from {}", peer);

                        let config = Arc::clone(&self.config);
                        let pool = self.pool.clone();

                        tasks.spawn(async move {
                            if let Err(e) = serve_connection(downstream, peer, config, pool).await {
                                warn!("Connection from {} dropped: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        // One failed accept must never take the listener down
                        error!("Error accepting connection: {}", e);
                    }
                },
            }
        }

        info!("Relay shutting down, closing {} in-flight connection(s)", tasks.len());
        tasks.shutdown().await;

        Ok(())
    }
}

/// Probe, classify, dial and relay a single connection
///
/// Every error here is connection-scoped: the downstream socket is dropped
/// on return and the accept loop is unaffected.
async fn serve_connection(
    mut downstream: TcpStream,
    peer: SocketAddr,
    config: Arc<RelayConfig>,
    pool: BufferPool,
) -> Result<()> {
    let prefix = read_prefix(&mut downstream, config.probe_timeout()).await?;

    let kind = protocol::detect(&prefix);
    let upstream_port = match kind.classification() {
        Classification::TlsOrSsl => config.upstream_port_ssl,
        Classification::Other => config.upstream_port_ssh,
    };
    debug!("{} from {}, routing to port {}", kind, peer, upstream_port);

    let mut upstream = dial_upstream(&config, upstream_port).await?;

    // The probe bytes were already consumed from the wire; the upstream must
    // see them first, before the pumps start.
    upstream.write_all(&prefix).await.map_err(RelayError::Io)?;

    Bridge::new(downstream, upstream, peer).run(&pool).await
}

/// Read the 6-byte protocol prefix under the configured timeout
async fn read_prefix(stream: &mut TcpStream, limit: Duration) -> Result<[u8; PREFIX_LEN]> {
    let mut prefix = [0u8; PREFIX_LEN];

    match timeout(limit, stream.read_exact(&mut prefix)).await {
        Ok(Ok(_)) => Ok(prefix),
        Ok(Err(e)) => Err(RelayError::Io(e)),
        Err(_) => Err(RelayError::Timeout(format!(
            "no protocol prefix within {:?}",
            limit
        ))),
    }
}

/// Dial the chosen upstream port under the configured connect timeout
async fn dial_upstream(config: &RelayConfig, port: u16) -> Result<TcpStream> {
    let host = config.upstream_host.as_str();

    match timeout(config.connect_timeout(), TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(RelayError::Io(e)),
        Err(_) => Err(RelayError::Timeout(format!(
            "connect to {}:{} timed out after {:?}",
            host,
            port,
            config.connect_timeout()
        ))),
    }
}
