//! Peer-facing RPC service
//!
//! Unary calls answer from the ledgers directly. Opening a gossip stream
//! enrolls the caller's outbound queue in the matching registry and hands
//! back the per-connection handler.

use crate::core::{Block, Ledger, Network, Transaction};
use crate::mining::Miner;
use crate::network::gossip::{BlockGossip, TransactionGossip};
use crate::network::message::{
    BlockRequest, BlockResponse, PartialChainRequest, PartialChainResponse, Request, Response,
    RpcError, UtxoRequest, UtxoResponse, WelcomeModel, WelcomeRequest, WelcomeResponse,
    PROTOCOL_VERSION,
};
use crate::network::peer::{PeerRegistry, DEFAULT_PEER_QUEUE};
use crate::wallet::WalletStore;
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Ledgers served by this node, one per network
pub type ChainSet = BTreeMap<Network, Arc<dyn Ledger>>;

pub(crate) struct ServiceState {
    pub(crate) chains: ChainSet,
    pub(crate) miner: Arc<dyn Miner>,
    pub(crate) wallet: Arc<dyn WalletStore>,
    pub(crate) transaction_peers: Arc<PeerRegistry<Transaction>>,
    pub(crate) block_peers: Arc<PeerRegistry<Block>>,
}

impl ServiceState {
    pub(crate) fn ledger(&self, network: Network) -> Result<&Arc<dyn Ledger>, RpcError> {
        self.chains
            .get(&network)
            .ok_or(RpcError::UnknownNetwork(network))
    }
}

/// The RPC surface offered to peers
#[derive(Clone)]
pub struct NodeService {
    state: Arc<ServiceState>,
    peer_queue: usize,
}

impl NodeService {
    pub fn new(chains: ChainSet, miner: Arc<dyn Miner>, wallet: Arc<dyn WalletStore>) -> Self {
        Self {
            state: Arc::new(ServiceState {
                chains,
                miner,
                wallet,
                transaction_peers: Arc::new(PeerRegistry::new()),
                block_peers: Arc::new(PeerRegistry::new()),
            }),
            peer_queue: DEFAULT_PEER_QUEUE,
        }
    }

    /// Capacity of each peer's outbound gossip queue
    pub fn with_peer_queue(mut self, capacity: usize) -> Self {
        self.peer_queue = capacity.max(1);
        self
    }

    pub fn peer_queue(&self) -> usize {
        self.peer_queue
    }

    pub fn chains(&self) -> &ChainSet {
        &self.state.chains
    }

    pub fn transaction_peers(&self) -> &Arc<PeerRegistry<Transaction>> {
        &self.state.transaction_peers
    }

    pub fn block_peers(&self) -> &Arc<PeerRegistry<Block>> {
        &self.state.block_peers
    }

    /// Dispatch a unary request
    pub fn handle(&self, request: Request) -> Result<Response, RpcError> {
        match request {
            Request::Welcome(req) => Ok(Response::Welcome(self.welcome(req))),
            Request::GetBlock(req) => self.get_block(req).map(Response::Block),
            Request::GetPartialChain(req) => {
                self.get_partial_chain(req).map(Response::PartialChain)
            }
            Request::GetUtxos(req) => self.get_utxos(req).map(Response::Utxos),
        }
    }

    /// Snapshot of every served network
    pub fn welcome(&self, request: WelcomeRequest) -> WelcomeResponse {
        log::info!("A {} just joined", request.peer_type);

        let welcomes = self
            .state
            .chains
            .iter()
            .map(|(network, ledger)| {
                let snapshot = ledger.snapshot();
                WelcomeModel {
                    network: *network,
                    timestamp: Utc::now().timestamp(),
                    difficulty: snapshot.difficulty,
                    reward: snapshot.reward,
                    latest_block: snapshot.latest_block,
                }
            })
            .collect();

        WelcomeResponse {
            version: PROTOCOL_VERSION,
            welcomes,
        }
    }

    pub fn get_block(&self, request: BlockRequest) -> Result<BlockResponse, RpcError> {
        let ledger = self.state.ledger(request.network)?;
        let block = ledger.block(&request.hash).ok_or_else(|| {
            RpcError::NotFound(format!(
                "block {} on network {}",
                request.hash, request.network
            ))
        })?;

        Ok(BlockResponse {
            network: request.network,
            block,
        })
    }

    /// Blocks `start_index..=end_index`, found by walking back from the tip
    pub fn get_partial_chain(
        &self,
        request: PartialChainRequest,
    ) -> Result<PartialChainResponse, RpcError> {
        let ledger = self.state.ledger(request.network)?;
        let (start, end) = (request.start_index, request.end_index);

        if start > end {
            return Err(RpcError::InvalidArgument(format!(
                "start index {} is after end index {}",
                start, end
            )));
        }

        let length = ledger.length();
        if end >= length {
            return Err(RpcError::InvalidArgument(format!(
                "requested chain through index {} but only {} blocks are held",
                end, length
            )));
        }

        let mut blocks = VecDeque::new();
        let mut cursor = Some(ledger.latest_block());
        while let Some(block) = cursor {
            if block.index >= start && block.index <= end {
                blocks.push_front(block.clone());
            }
            cursor = block.previous_hash().and_then(|hash| ledger.block(hash));
        }

        Ok(PartialChainResponse {
            network: request.network,
            blocks: blocks.into(),
        })
    }

    pub fn get_utxos(&self, request: UtxoRequest) -> Result<UtxoResponse, RpcError> {
        let ledger = self.state.ledger(request.network)?;
        let utxos = ledger
            .utxos_for_address(&request.address)
            .map_err(|e| {
                log::warn!("GetUtxos on {} failed: {}", request.network, e);
                RpcError::Ledger(e.to_string())
            })?;

        Ok(UtxoResponse {
            network: request.network,
            utxos,
        })
    }

    /// Open the transaction gossip stream for one connection
    ///
    /// `outbound` receives every transaction broadcast on the channel for as
    /// long as the returned handler stays open.
    pub async fn stream_transactions(
        &self,
        addr: Option<SocketAddr>,
        outbound: mpsc::Sender<Transaction>,
    ) -> TransactionGossip {
        let id = self.state.transaction_peers.enroll(addr, outbound).await;
        TransactionGossip::new(Arc::clone(&self.state), id)
    }

    /// Open the block gossip stream for one connection
    pub async fn stream_blocks(
        &self,
        addr: Option<SocketAddr>,
        outbound: mpsc::Sender<Block>,
    ) -> BlockGossip {
        let id = self.state.block_peers.enroll(addr, outbound).await;
        BlockGossip::new(Arc::clone(&self.state), id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::Blockchain;
    use crate::mining::ProofOfWorkMiner;
    use crate::network::message::PeerType;
    use crate::wallet::Wallet;

    /// Chain of `length` blocks on the test network, starting at difficulty 2
    pub(crate) fn chain_of(length: u64) -> Arc<Blockchain> {
        let chain = Blockchain::with_difficulty(Network::Test, 2);
        while chain.length() < length {
            let latest = chain.latest_block();
            let reward = Transaction::reward(
                Network::Test,
                &Network::Test.charity_address(),
                chain.reward(),
                latest.index + 1,
            );
            let block = ProofOfWorkMiner.find_block(
                Network::Test,
                latest.index + 1,
                &latest.hash,
                vec![reward],
                chain.difficulty(),
            );
            assert!(chain.append_block(block));
        }
        Arc::new(chain)
    }

    pub(crate) fn service_with(chain: Arc<Blockchain>) -> NodeService {
        let mut chains: ChainSet = BTreeMap::new();
        chains.insert(Network::Test, chain);
        NodeService::new(
            chains,
            Arc::new(ProofOfWorkMiner),
            Arc::new(Wallet::empty()),
        )
    }

    fn partial(start: u64, end: u64) -> PartialChainRequest {
        PartialChainRequest {
            network: Network::Test,
            start_index: start,
            end_index: end,
        }
    }

    #[test]
    fn test_welcome_lists_every_network() {
        let chain = chain_of(3);
        let service = service_with(Arc::clone(&chain));

        let response = service.welcome(WelcomeRequest {
            peer_type: PeerType::Node,
        });

        assert_eq!(response.version, PROTOCOL_VERSION);
        assert_eq!(response.welcomes.len(), 1);
        let welcome = &response.welcomes[0];
        assert_eq!(welcome.network, Network::Test);
        assert_eq!(welcome.latest_block, chain.latest_block());
        assert_eq!(welcome.difficulty, 2);
        assert_eq!(welcome.reward, chain.reward());
        assert!(welcome.timestamp > 0);
    }

    #[test]
    fn test_get_block_hit_and_miss() {
        let chain = chain_of(3);
        let service = service_with(Arc::clone(&chain));
        let wanted = chain.block_at(1).unwrap();

        let response = service
            .get_block(BlockRequest {
                network: Network::Test,
                hash: wanted.hash.clone(),
            })
            .unwrap();
        assert_eq!(response.block, wanted);

        let miss = service.get_block(BlockRequest {
            network: Network::Test,
            hash: "ff".repeat(32),
        });
        assert!(matches!(miss, Err(RpcError::NotFound(_))));
    }

    #[test]
    fn test_partial_chain_middle_range() {
        let service = service_with(chain_of(6));

        let response = service.get_partial_chain(partial(2, 4)).unwrap();
        let indices: Vec<u64> = response.blocks.iter().map(|b| b.index).collect();

        assert_eq!(indices, vec![2, 3, 4]);
        assert!(response
            .blocks
            .windows(2)
            .all(|pair| pair[1].previous_hash() == Some(pair[0].hash.as_str())));
    }

    #[test]
    fn test_partial_chain_whole_chain_and_single_block() {
        let service = service_with(chain_of(6));

        let all = service.get_partial_chain(partial(0, 5)).unwrap();
        assert_eq!(all.blocks.len(), 6);
        assert_eq!(all.blocks[0].index, 0);

        let one = service.get_partial_chain(partial(5, 5)).unwrap();
        assert_eq!(one.blocks.len(), 1);
        assert_eq!(one.blocks[0].index, 5);
    }

    #[test]
    fn test_partial_chain_beyond_held_length() {
        let service = service_with(chain_of(6));

        for end in [6, 7, 100] {
            match service.get_partial_chain(partial(2, end)) {
                Err(RpcError::InvalidArgument(message)) => {
                    assert!(message.contains("only 6 blocks are held"))
                }
                other => panic!("expected range error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_partial_chain_inverted_range() {
        let service = service_with(chain_of(6));
        assert!(matches!(
            service.get_partial_chain(partial(4, 2)),
            Err(RpcError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unknown_network() {
        let service = service_with(chain_of(1));
        let result = service.handle(Request::GetBlock(BlockRequest {
            network: Network::Main,
            hash: String::new(),
        }));
        assert_eq!(result, Err(RpcError::UnknownNetwork(Network::Main)));
    }

    #[test]
    fn test_get_utxos() {
        let service = service_with(chain_of(3));

        let response = service
            .get_utxos(UtxoRequest {
                network: Network::Test,
                address: Network::Test.charity_address(),
            })
            .unwrap();
        // genesis output plus two block rewards
        assert_eq!(response.utxos.len(), 3);
        assert_eq!(response.network, Network::Test);
    }

    #[test]
    fn test_get_utxos_wrong_network_address_is_an_error() {
        let service = service_with(chain_of(1));

        let result = service.handle(Request::GetUtxos(UtxoRequest {
            network: Network::Test,
            address: Network::Main.charity_address(),
        }));
        assert!(matches!(result, Err(RpcError::Ledger(_))));
    }
}
