//! Mesh-relay node binary.
//!
//! # Usage
//!
//! ```bash
//! # Start the first node
//! meshrelay-node --listen 127.0.0.1:9001
//!
//! # Start a second node, peered with the first
//! meshrelay-node --listen 127.0.0.1:9002 --peer 127.0.0.1:9001
//!
//! # Three-node chain: C -> B -> A
//! meshrelay-node --listen 127.0.0.1:9003 --peer 127.0.0.1:9002
//! ```

use clap::Parser;
use meshrelay_core::MAX_PEERS;
use meshrelay_node::{FileKeyStore, NodeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// A mesh-relay node: TTL-flood broadcast over an arbitrary peer topology.
#[derive(Parser, Debug)]
#[command(name = "meshrelay-node")]
#[command(about = "Free mesh. No tower. No ISP. No permission.")]
#[command(version)]
struct Args {
    /// Address to listen on (`host:port`)
    #[arg(short, long)]
    listen: String,

    /// Address of another node to connect to (repeatable, up to MAX_PEERS)
    #[arg(short, long = "peer")]
    peers: Vec<String>,

    /// Node display name (defaults to a hex prefix of its public key)
    #[arg(short, long)]
    name: Option<String>,

    /// Default TTL stamped on locally-originated messages
    #[arg(short, long, default_value_t = 7)]
    ttl: u8,

    /// Don't relay packets from other nodes (receive only)
    #[arg(long = "no-relay")]
    no_relay: bool,

    /// Print relay statistics every 30 seconds
    #[arg(long)]
    stats: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    if args.peers.len() > MAX_PEERS {
        tracing::warn!("{} --peer addresses given, only the first {MAX_PEERS} will be dialed", args.peers.len());
    }

    let config = NodeConfig {
        listen_addr: args.listen,
        connect_peers: args.peers.into_iter().take(MAX_PEERS).collect(),
        name: args.name,
        ttl: args.ttl,
        relay_enabled: !args.no_relay,
        print_stats: args.stats,
    };

    let key_store = FileKeyStore::from_env();
    let env = meshrelay_node::SystemEnv::new();

    meshrelay_node::run(env, &key_store, config).await?;

    Ok(())
}
