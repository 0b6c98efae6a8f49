// src/main.rs - embercoin node entry point
use clap::Parser;
use log::{error, info};

use embercoin::{init_logging, Node, NodeConfig};

/// Runs an embercoin node: maintains the chain, mines on request, and
/// gossips with peers over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "embercoin-node", version, about)]
struct Cli {
    /// P2P listener port. Overrides EMBERCOIN_SOCKET_PORT.
    #[arg(long, env = "EMBERCOIN_SOCKET_PORT")]
    port: Option<u16>,

    /// Comma-separated ws:// peer URLs to dial at startup.
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Disable the P2P service entirely.
    #[arg(long)]
    no_network: bool,

    /// Mine a single block on startup and exit (useful for local testing).
    #[arg(long)]
    mine_once: bool,
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let mut config = match NodeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("fatal: invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Some(port) = cli.port {
        config.socket_port = port;
    }
    if !cli.peers.is_empty() {
        config.peer_nodes = cli.peers;
    }
    if cli.no_network {
        config.enable_network = false;
    }

    if let Err(e) = config.validate() {
        error!("fatal: invalid configuration: {e}");
        std::process::exit(1);
    }

    let mut node = match Node::new(config.clone()) {
        Ok(node) => node,
        Err(e) => {
            error!("fatal: failed to initialize node: {e}");
            std::process::exit(1);
        }
    };

    info!(
        "embercoin node starting: wallet address {}, port {}, network {}",
        node.wallet.address(),
        config.socket_port,
        if config.enable_network { "enabled" } else { "disabled" }
    );

    if cli.mine_once {
        let outcome = node.mine();
        if outcome.ok {
            info!("{}", outcome.message);
        } else {
            error!("mining failed: {}", outcome.message);
        }
        return;
    }

    if let Err(e) = node.run().await {
        error!("fatal: p2p service failed: {e}");
        std::process::exit(1);
    }
}
