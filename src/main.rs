//! Peerchain CLI Application
//!
//! Runs a multi-network peer node and manages its reward wallet.

use clap::{Parser, Subcommand};
use peerchain::cli;
use peerchain::core::Network;
use peerchain::network::NodeConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "peerchain")]
#[command(version = "0.1.0")]
#[command(about = "Multi-network blockchain peer node", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// P2P node operations
    Node {
        #[command(subcommand)]
        action: NodeCommands,
    },

    /// Wallet operations
    Wallet {
        #[command(subcommand)]
        action: WalletCommands,
    },
}

#[derive(Subcommand)]
enum NodeCommands {
    /// Start the node and serve peers until interrupted
    Start {
        /// Port to listen on
        #[arg(short, long, default_value = "8333")]
        port: u16,

        /// Peers to catch up from at startup (comma-separated)
        #[arg(long)]
        peers: Option<String>,

        /// Networks to serve
        #[arg(long, value_delimiter = ',', default_values_t = Network::ALL)]
        networks: Vec<Network>,

        /// Wallet paying internally mined rewards
        #[arg(short, long, default_value = ".peerchain/wallet.json")]
        wallet: PathBuf,

        /// Outbound gossip queue length per peer
        #[arg(long, default_value = "256")]
        queue: usize,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Create a new wallet
    New {
        /// Where to write the wallet
        #[arg(short, long, default_value = ".peerchain/wallet.json")]
        output: PathBuf,

        /// Optional label
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Show a wallet's addresses
    Show {
        /// Wallet file
        #[arg(short, long, default_value = ".peerchain/wallet.json")]
        wallet: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Node { action } => match action {
            NodeCommands::Start {
                port,
                peers,
                networks,
                wallet,
                queue,
            } => {
                let config = NodeConfig {
                    port,
                    bootstrap_peers: cli::parse_peers(peers.as_deref()),
                    networks,
                    wallet_path: wallet,
                    peer_queue: queue,
                };

                let rt = tokio::runtime::Runtime::new()?;
                rt.block_on(cli::cmd_node_start(config))?;
            }
        },

        Commands::Wallet { action } => match action {
            WalletCommands::New { output, label } => {
                cli::cmd_wallet_new(&output, label.as_deref())?;
            }
            WalletCommands::Show { wallet } => {
                cli::cmd_wallet_show(&wallet)?;
            }
        },
    }

    Ok(())
}
