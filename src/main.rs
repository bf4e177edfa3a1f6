//! SSH/SSL Relay command line tool
//!
//! This binary is the command-line interface for the relay. It assembles the
//! configuration (defaults, then an optional JSON file, then environment
//! variables, then command-line flags), starts the acceptor and runs until
//! SIGINT or SIGTERM.

use clap::Parser;
use log::{error, info};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use ssh_ssl_relay::common::{init_logger, parse_socket_addr};
use ssh_ssl_relay::config::RelayConfig;
use ssh_ssl_relay::relay::Acceptor;
use ssh_ssl_relay::{Result, APP_NAME, VERSION};

/// Transparent relay that routes SSH and SSL/TLS clients sharing one port
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Listen address, e.g. 0.0.0.0:443
    #[clap(short, long)]
    listen: Option<String>,

    /// Upstream host serving both backends
    #[clap(short, long)]
    upstream_host: Option<String>,

    /// Upstream port for SSH (and any non-TLS) clients
    #[clap(long)]
    ssh_port: Option<u16>,

    /// Upstream port for SSL/TLS clients
    #[clap(long)]
    ssl_port: Option<u16>,

    /// Milliseconds a client may take to send its first 6 bytes
    #[clap(long)]
    probe_timeout_ms: Option<u64>,

    /// Relay buffer size per direction, in bytes
    #[clap(long)]
    buffer_size: Option<usize>,

    /// Load configuration from a JSON file
    #[clap(long)]
    config_file: Option<String>,

    /// Log level
    #[clap(long)]
    log_level: Option<String>,
}

fn build_config(args: &Args) -> Result<RelayConfig> {
    // Defaults first, then file, then environment, then flags
    let mut config = match &args.config_file {
        Some(path) => RelayConfig::from_file(Path::new(path))?,
        None => RelayConfig::default(),
    };

    config.apply_env()?;

    if let Some(listen) = &args.listen {
        config.listen = parse_socket_addr(listen)?;
    }
    if let Some(host) = &args.upstream_host {
        config.upstream_host = host.clone();
    }
    if let Some(port) = args.ssh_port {
        config.upstream_port_ssh = port;
    }
    if let Some(port) = args.ssl_port {
        config.upstream_port_ssl = port;
    }
    if let Some(timeout) = args.probe_timeout_ms {
        config.probe_timeout_ms = timeout;
    }
    if let Some(size) = args.buffer_size {
        config.buffer_size = size;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Cancel the token on SIGINT or SIGTERM
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received interrupt");
    }

    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The configured level must win, so the config is assembled before the
    // logger comes up.
    let config = Arc::new(build_config(&args)?);
    init_logger(&config.log_level);

    info!("Starting {} v{}", APP_NAME, VERSION);
    if let Some(path) = &args.config_file {
        info!("Loaded configuration from file: {}", path);
    }

    info!("Listen address: {}", config.listen);
    info!(
        "Upstream: {} (ssh port {}, ssl port {})",
        config.upstream_host, config.upstream_port_ssh, config.upstream_port_ssl
    );

    let acceptor = Acceptor::bind(config).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    info!("Relay ready, press Ctrl+C to stop");

    acceptor.run(shutdown).await
}
