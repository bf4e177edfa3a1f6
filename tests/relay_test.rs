//! End-to-end relay tests
//!
//! These tests run the real acceptor against loopback backends: one
//! connection per classified protocol, probe bytes replayed first, byte-exact
//! forwarding, probe timeouts and isolation between bridges.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ssh_ssl_relay::config::RelayConfig;
use ssh_ssl_relay::relay::Acceptor;

/// Backend that records everything each connection sends until EOF
struct RecordingBackend {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    received: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl RecordingBackend {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let (tx, received) = mpsc::unbounded_channel();

        let conn_count = Arc::clone(&connections);
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => break,
                };
                conn_count.fetch_add(1, Ordering::SeqCst);

                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut data = Vec::new();
                    let mut buf = [0u8; 4096];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => data.extend_from_slice(&buf[..n]),
                        }
                    }
                    let _ = tx.send(data);
                });
            }
        });

        Self {
            addr,
            connections,
            received,
        }
    }

    fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Backend that echoes everything back
async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    addr
}

async fn start_relay(ssh_port: u16, ssl_port: u16, probe_timeout_ms: u64) -> (SocketAddr, CancellationToken) {
    let config = Arc::new(RelayConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        upstream_host: "127.0.0.1".to_string(),
        upstream_port_ssh: ssh_port,
        upstream_port_ssl: ssl_port,
        probe_timeout_ms,
        ..RelayConfig::default()
    });

    let acceptor = Acceptor::bind(config).await.unwrap();
    let addr = acceptor.local_addr().unwrap();

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        acceptor.run(token).await.unwrap();
    });

    (addr, shutdown)
}

#[tokio::test]
async fn tls_client_reaches_ssl_upstream_with_probe_bytes_first() {
    let ssh = RecordingBackend::start().await;
    let mut ssl = RecordingBackend::start().await;
    let (relay, _shutdown) = start_relay(ssh.addr.port(), ssl.addr.port(), 5000).await;

    // TLS 1.0 handshake record header followed by a large fake hello; the
    // payload spans several 8192-byte relay buffers.
    let mut sent = vec![0x16, 0x03, 0x01, 0x00, 0x31, 0x01];
    sent.extend((0..20000u32).map(|i| (i % 239) as u8));

    let mut client = TcpStream::connect(relay).await.unwrap();
    client.write_all(&sent).await.unwrap();
    client.shutdown().await.unwrap();

    let received = ssl.received.recv().await.unwrap();
    assert_eq!(received, sent, "upstream must see the exact client byte stream");
    assert_eq!(ssh.connection_count(), 0, "no connection may reach the SSH port");
}

#[tokio::test]
async fn ssh_banner_reaches_ssh_upstream() {
    let mut ssh = RecordingBackend::start().await;
    let ssl = RecordingBackend::start().await;
    let (relay, _shutdown) = start_relay(ssh.addr.port(), ssl.addr.port(), 5000).await;

    let banner = b"SSH-2.0-OpenSSH_9.6\r\n".to_vec();

    let mut client = TcpStream::connect(relay).await.unwrap();
    client.write_all(&banner).await.unwrap();
    client.shutdown().await.unwrap();

    let received = ssh.received.recv().await.unwrap();
    assert_eq!(received, banner);
    assert_eq!(ssl.connection_count(), 0);
}

#[tokio::test]
async fn sslv2_hello_reaches_ssl_upstream() {
    let ssh = RecordingBackend::start().await;
    let mut ssl = RecordingBackend::start().await;
    let (relay, _shutdown) = start_relay(ssh.addr.port(), ssl.addr.port(), 5000).await;

    // High bit set, record length 43, message type 0x01
    let hello = vec![0x80, 0x2B, 0x01, 0x00, 0x02, 0x00];

    let mut client = TcpStream::connect(relay).await.unwrap();
    client.write_all(&hello).await.unwrap();
    client.shutdown().await.unwrap();

    let received = ssl.received.recv().await.unwrap();
    assert_eq!(received, hello);
    assert_eq!(ssh.connection_count(), 0);
}

#[tokio::test]
async fn slow_probe_is_cut_off_before_any_upstream_dial() {
    let ssh = RecordingBackend::start().await;
    let ssl = RecordingBackend::start().await;
    let (relay, _shutdown) = start_relay(ssh.addr.port(), ssl.addr.port(), 100).await;

    let mut client = TcpStream::connect(relay).await.unwrap();
    // Fewer than 6 bytes, then stall
    client.write_all(&[0x16, 0x03]).await.unwrap();

    // The relay must close the socket once the probe timeout expires.
    // Depending on timing the close surfaces as EOF or as a reset.
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
        .await
        .expect("relay did not close the stalled connection");
    match read {
        Ok(0) | Err(_) => {}
        Ok(n) => panic!("unexpected {} bytes from the relay", n),
    }

    assert_eq!(ssh.connection_count(), 0);
    assert_eq!(ssl.connection_count(), 0);
}

#[tokio::test]
async fn bridges_are_isolated_from_each_other() {
    let echo = start_echo_backend().await;
    // Both classifications land on the same echo backend here
    let (relay, _shutdown) = start_relay(echo.port(), echo.port(), 5000).await;

    let mut a = TcpStream::connect(relay).await.unwrap();
    let mut b = TcpStream::connect(relay).await.unwrap();

    a.write_all(b"SSH-2.0A").await.unwrap();
    b.write_all(b"SSH-2.0B").await.unwrap();

    let mut reply = [0u8; 8];
    a.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"SSH-2.0A");
    b.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"SSH-2.0B");

    // Killing A must not disturb B's in-flight relay
    drop(a);
    tokio::time::sleep(Duration::from_millis(50)).await;

    b.write_all(b"still-ok").await.unwrap();
    b.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"still-ok");

    // And the acceptor keeps accepting afterward
    let mut c = TcpStream::connect(relay).await.unwrap();
    c.write_all(b"SSH-2.0C").await.unwrap();
    c.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"SSH-2.0C");
}

#[tokio::test]
async fn dial_failure_drops_client_but_keeps_accepting() {
    // Point the relay at ports nobody listens on
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = closed.local_addr().unwrap().port();
    drop(closed);

    let (relay, _shutdown) = start_relay(dead_port, dead_port, 5000).await;

    let mut first = TcpStream::connect(relay).await.unwrap();
    first.write_all(b"SSH-2.0-x\r\n").await.unwrap();

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), first.read(&mut buf))
        .await
        .expect("relay did not drop the client after the failed dial");
    match read {
        Ok(0) | Err(_) => {}
        Ok(n) => panic!("unexpected {} bytes from the relay", n),
    }

    // The accept loop must survive the failure
    let echo = start_echo_backend().await;
    let (relay, _shutdown) = start_relay(echo.port(), echo.port(), 5000).await;
    let mut second = TcpStream::connect(relay).await.unwrap();
    second.write_all(b"SSH-2.0D").await.unwrap();
    let mut reply = [0u8; 8];
    second.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"SSH-2.0D");
}

#[tokio::test]
async fn shutdown_stops_the_listener() {
    let echo = start_echo_backend().await;
    let (relay, shutdown) = start_relay(echo.port(), echo.port(), 5000).await;

    // Healthy before shutdown
    let mut client = TcpStream::connect(relay).await.unwrap();
    client.write_all(b"SSH-2.0E").await.unwrap();
    let mut reply = [0u8; 8];
    client.read_exact(&mut reply).await.unwrap();

    shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The listening socket is gone; new connections are refused
    assert!(TcpStream::connect(relay).await.is_err());
}
