//! CLI commands for the node
//!
//! Implements the command handlers behind the `peerchain` binary.

use crate::core::Network;
use crate::network::{Node, NodeConfig};
use crate::wallet::{Wallet, WalletStore};
use std::path::Path;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Create a wallet file
pub fn cmd_wallet_new(path: &Path, label: Option<&str>) -> CliResult<()> {
    let wallet = Wallet::generate(label);
    wallet.save(path)?;

    println!("🔐 New wallet created!");
    println!("   📁 File: {}", path.display());
    print_addresses(&wallet);
    if let Some(l) = &wallet.label {
        println!("   🏷️  Label: {}", l);
    }
    println!("\n   ⚠️  IMPORTANT: The private key is stored unencrypted in this file.");
    println!("   Back it up to keep access to your mining rewards!");

    Ok(())
}

/// Show the wallet a node would use
pub fn cmd_wallet_show(path: &Path) -> CliResult<()> {
    let wallet = Wallet::open(path)?;

    if !wallet.has_keypair() {
        println!("📭 No wallet at {}. Create one with: peerchain wallet new", path.display());
        println!("   Internally mined rewards go to each network's charity address.");
        return Ok(());
    }

    println!("👛 Wallet {}", path.display());
    if let Some(l) = &wallet.label {
        println!("   🏷️  Label: {}", l);
    }
    print_addresses(&wallet);

    Ok(())
}

fn print_addresses(wallet: &Wallet) {
    if let Some(key_pair) = wallet.key_pair() {
        println!("   🔑 Public key: {}", key_pair.public_key_hex());
    }
    for network in Network::ALL {
        if let Some(address) = wallet.address_for(network) {
            println!("   📍 {} address: {}", network, address);
        }
    }
}

/// Run a node until interrupted
pub async fn cmd_node_start(config: NodeConfig) -> CliResult<()> {
    let networks: Vec<String> = config.networks.iter().map(|n| n.to_string()).collect();
    println!(
        "🌐 Starting node on port {} ({})...",
        config.port,
        networks.join(", ")
    );

    let node = Node::new(config)?;
    if !node.status().await.has_wallet {
        println!("   ℹ️  No wallet loaded; mining rewards go to charity.");
    }

    tokio::select! {
        result = node.start() => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("\n📴 Shutting down node...");
            let status = node.status().await;
            for network in &status.networks {
                println!(
                    "   {} height {} ({})",
                    network.network,
                    network.height,
                    &network.latest_hash[..16.min(network.latest_hash.len())]
                );
            }
        }
    }

    Ok(())
}

/// Split a comma-separated peer list
pub fn parse_peers(peers: Option<&str>) -> Vec<String> {
    peers
        .map(|p| {
            p.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
