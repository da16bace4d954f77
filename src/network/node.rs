//! Peer node
//!
//! Wires the ledgers, the miner and the wallet into a [`NodeService`], catches
//! up from bootstrap peers and serves connections.

use crate::core::{Blockchain, Ledger, Network};
use crate::mining::ProofOfWorkMiner;
use crate::network::client::PeerClient;
use crate::network::peer::DEFAULT_PEER_QUEUE;
use crate::network::server::Server;
use crate::network::service::{ChainSet, NodeService};
use crate::network::sync::{ChainSync, SyncReport};
use crate::wallet::{Wallet, WalletError, WalletStore};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Node startup errors
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("No networks configured")]
    NoNetworks,
}

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port to listen on
    pub port: u16,
    /// Peers to catch up from at startup
    pub bootstrap_peers: Vec<String>,
    /// Networks served by this node
    pub networks: Vec<Network>,
    /// Wallet paying internal mining rewards; may not exist
    pub wallet_path: PathBuf,
    /// Capacity of each peer's outbound gossip queue
    pub peer_queue: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: 8333,
            bootstrap_peers: Vec::new(),
            networks: Network::ALL.to_vec(),
            wallet_path: PathBuf::from(".peerchain/wallet.json"),
            peer_queue: DEFAULT_PEER_QUEUE,
        }
    }
}

/// The peer node
pub struct Node {
    pub config: NodeConfig,
    service: NodeService,
    has_wallet: bool,
}

impl Node {
    /// Build ledgers and the service
    ///
    /// Fails if the wallet file exists but cannot be loaded.
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        if config.networks.is_empty() {
            return Err(NodeError::NoNetworks);
        }

        let wallet = Wallet::open(&config.wallet_path)?;
        let has_wallet = wallet.has_keypair();

        let mut chains: ChainSet = BTreeMap::new();
        for network in &config.networks {
            chains.insert(*network, Arc::new(Blockchain::new(*network)));
        }

        let service = NodeService::new(chains, Arc::new(ProofOfWorkMiner), Arc::new(wallet))
            .with_peer_queue(config.peer_queue);

        Ok(Self {
            config,
            service,
            has_wallet,
        })
    }

    pub fn service(&self) -> &NodeService {
        &self.service
    }

    /// Catch up from every bootstrap peer in turn
    ///
    /// Unreachable or misbehaving peers are logged and skipped.
    pub async fn bootstrap(&self) -> SyncReport {
        let sync = ChainSync::new(self.service.chains().clone());
        let mut total = SyncReport::new();

        for peer in &self.config.bootstrap_peers {
            let result = match PeerClient::connect(peer).await {
                Ok(mut client) => sync.catch_up(&mut client).await,
                Err(e) => Err(e.into()),
            };

            match result {
                Ok(report) => {
                    for (network, added) in report {
                        *total.entry(network).or_insert(0) += added;
                    }
                }
                Err(e) => log::warn!("Could not sync from {}: {}", peer, e),
            }
        }

        total
    }

    /// Bind, catch up and serve until the task is dropped
    pub async fn start(&self) -> Result<(), NodeError> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.port));
        let server = Server::bind(addr).await?;

        let networks: Vec<String> = self.config.networks.iter().map(|n| n.to_string()).collect();
        log::info!(
            "Node started on port {} serving {}",
            server.local_addr().port(),
            networks.join(", ")
        );

        for (network, added) in self.bootstrap().await {
            log::info!("[{}] caught up {} blocks", network, added);
        }

        server.serve(self.service.clone()).await;
        Ok(())
    }

    /// Get node status
    pub async fn status(&self) -> NodeStatus {
        let networks = self
            .service
            .chains()
            .iter()
            .map(|(network, ledger)| {
                let snapshot = ledger.snapshot();
                NetworkStatus {
                    network: *network,
                    height: snapshot.latest_block.index,
                    difficulty: snapshot.difficulty,
                    latest_hash: snapshot.latest_block.hash,
                }
            })
            .collect();

        NodeStatus {
            port: self.config.port,
            networks,
            transaction_peers: self.service.transaction_peers().len().await,
            block_peers: self.service.block_peers().len().await,
            has_wallet: self.has_wallet,
        }
    }
}

/// Per-network status
#[derive(Debug, Clone)]
pub struct NetworkStatus {
    pub network: Network,
    pub height: u64,
    pub difficulty: u32,
    pub latest_hash: String,
}

/// Node status information
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub port: u16,
    pub networks: Vec<NetworkStatus>,
    pub transaction_peers: usize,
    pub block_peers: usize,
    pub has_wallet: bool,
}
