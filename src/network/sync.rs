//! Chain synchronization with peers
//!
//! Pulls the blocks a peer holds beyond our tip, network by network.

use crate::core::{Ledger, Network};
use crate::network::client::{ClientError, PeerClient};
use crate::network::message::{PeerType, PROTOCOL_VERSION};
use crate::network::service::ChainSet;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Blocks to request per batch
pub const SYNC_BATCH_SIZE: u64 = 50;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Peer error: {0}")]
    Client(#[from] ClientError),
    #[error("Peer speaks protocol version {0}, expected {1}")]
    VersionMismatch(u32, u32),
}

/// Blocks appended per network during one catch-up
pub type SyncReport = BTreeMap<Network, u64>;

/// Chain synchronization manager
pub struct ChainSync {
    chains: ChainSet,
}

impl ChainSync {
    pub fn new(chains: ChainSet) -> Self {
        Self { chains }
    }

    /// Fetch and append everything `client`'s peer holds past our tips
    ///
    /// Networks the peer does not share with us are skipped. Syncing a
    /// network stops at the first block the ledger refuses.
    pub async fn catch_up(&self, client: &mut PeerClient) -> Result<SyncReport, SyncError> {
        let welcome = client.welcome(PeerType::Node).await?;
        if welcome.version != PROTOCOL_VERSION {
            return Err(SyncError::VersionMismatch(welcome.version, PROTOCOL_VERSION));
        }

        let mut report = SyncReport::new();
        for remote in welcome.welcomes {
            let Some(ledger) = self.chains.get(&remote.network) else {
                continue;
            };

            let our_height = ledger.latest_block().index;
            let peer_height = remote.latest_block.index;
            if peer_height <= our_height {
                continue;
            }

            log::info!(
                "[{}] peer {} is ahead ({} vs {}), starting sync",
                remote.network,
                client.peer_addr(),
                peer_height,
                our_height
            );

            let added =
                Self::sync_network(ledger, client, remote.network, our_height, peer_height).await?;
            report.insert(remote.network, added);
        }

        Ok(report)
    }

    async fn sync_network(
        ledger: &Arc<dyn Ledger>,
        client: &mut PeerClient,
        network: Network,
        our_height: u64,
        peer_height: u64,
    ) -> Result<u64, SyncError> {
        let mut added = 0u64;
        let mut next = our_height + 1;

        while next <= peer_height {
            let end = (next + SYNC_BATCH_SIZE - 1).min(peer_height);

            let batch = match client.get_partial_chain(network, next, end).await {
                Ok(response) => response.blocks,
                Err(ClientError::Remote(e)) => {
                    log::warn!("[{}] peer refused blocks {}..={}: {}", network, next, end, e);
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            if batch.is_empty() {
                break;
            }

            for block in batch {
                let index = block.index;
                if !ledger.append_block(block) {
                    log::warn!("[{}] sync stopped: block {} rejected", network, index);
                    return Ok(added);
                }
                added += 1;
                next = index + 1;
            }

            log::info!("[{}] synced to block {}/{}", network, next - 1, peer_height);
        }

        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Blockchain;
    use crate::network::server::Server;
    use crate::network::service::tests::{chain_of, service_with};

    async fn serve(length: u64) -> (Arc<Blockchain>, String) {
        let chain = chain_of(length);
        let server = Server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = server.local_addr().to_string();
        tokio::spawn(server.serve(service_with(Arc::clone(&chain))));
        (chain, addr)
    }

    fn local(chain: Arc<Blockchain>) -> ChainSet {
        let mut chains: ChainSet = BTreeMap::new();
        chains.insert(Network::Test, chain);
        chains
    }

    #[tokio::test]
    async fn test_catch_up_across_batches() {
        let (remote, addr) = serve(SYNC_BATCH_SIZE + 8).await;
        let ours = Arc::new(Blockchain::with_difficulty(Network::Test, 2));
        let sync = ChainSync::new(local(Arc::clone(&ours)));

        let mut client = PeerClient::connect(&addr).await.unwrap();
        let report = sync.catch_up(&mut client).await.unwrap();

        assert_eq!(report.get(&Network::Test), Some(&(SYNC_BATCH_SIZE + 7)));
        assert_eq!(ours.length(), remote.length());
        assert_eq!(ours.latest_block(), remote.latest_block());
    }

    #[tokio::test]
    async fn test_nothing_to_do_when_not_behind() {
        let (_, addr) = serve(3).await;
        let ours = chain_of(3);
        let sync = ChainSync::new(local(Arc::clone(&ours)));

        let mut client = PeerClient::connect(&addr).await.unwrap();
        let report = sync.catch_up(&mut client).await.unwrap();

        assert!(report.is_empty());
        assert_eq!(ours.length(), 3);
    }

    #[tokio::test]
    async fn test_diverged_chain_stops_at_first_rejection() {
        let (_, addr) = serve(5).await;
        // same length prefix, different block contents
        let ours = chain_of(2);
        let sync = ChainSync::new(local(Arc::clone(&ours)));

        let mut client = PeerClient::connect(&addr).await.unwrap();
        let report = sync.catch_up(&mut client).await.unwrap();

        assert_eq!(report.get(&Network::Test), Some(&0));
        assert_eq!(ours.length(), 2);
    }
}
