//! hns-resolver: a local SPV naming resolver for the Handshake chain,
//! exposed as a DoH and DoT DNS server.
//!
//! Syncs block headers over a lightweight P2P protocol, verifies name
//! resolution against the synced chain's radix-tree root, and answers
//! DNS-over-HTTPS and DNS-over-TLS queries with the result. ICANN TLDs are
//! forwarded to an upstream resolver instead of resolved locally.

use std::path::PathBuf;

use clap::Parser;

mod blocklist;
mod config;
mod dns;
mod p2p;
mod peer;
mod proof_client;
mod service;
mod sync;

use config::ResolverConfig;
use service::Service;

/// hns-resolver - SPV naming resolver for the Handshake chain
#[derive(Parser, Debug)]
#[command(name = "hns-resolver")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Local DoH/DoT resolver backed by SPV header sync and radix-tree proofs", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "hns-resolver.toml")]
    config: PathBuf,

    /// Data directory for the header store and learned peers
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// DoH (HTTPS) listen port
    #[arg(long)]
    doh_port: Option<u16>,

    /// DoT (TLS) listen port
    #[arg(long)]
    dot_port: Option<u16>,

    /// P2P listen/connect port for header and proof peers
    #[arg(long)]
    p2p_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .init();

    tracing::info!("hns-resolver v{}", env!("CARGO_PKG_VERSION"));

    tokio::fs::create_dir_all(&args.data_dir).await?;

    let mut config = if args.config.exists() {
        ResolverConfig::load(&args.config)?
    } else {
        tracing::warn!("config file {:?} not found, using defaults", args.config);
        ResolverConfig::default()
    };

    if let Some(port) = args.doh_port {
        config = config.with_doh_port(port);
    }
    if let Some(port) = args.dot_port {
        config = config.with_dot_port(port);
    }
    if let Some(port) = args.p2p_port {
        config = config.with_p2p_port(port);
    }
    config.validate()?;

    tracing::info!(
        "config: doh_port={} dot_port={} p2p_port={} checkpoint_height={} window_size={}",
        config.doh_port,
        config.dot_port,
        config.p2p_port,
        config.checkpoint_height,
        config.window_size,
    );

    let service = Service::new(config, args.data_dir);
    service.run().await
}
