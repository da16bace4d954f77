//! Per-connection gossip handlers
//!
//! A gossip stream is driven by one [`GossipHandler`] per connection. The
//! handler owns the connection's registry membership and releases it the
//! first time the stream ends, whether by a clean close or a fault.

use crate::core::{Block, Ledger, Transaction};
use crate::network::message::GossipItem;
use crate::network::peer::{PeerError, PeerId, PeerRegistry};
use crate::network::service::ServiceState;
use crate::wallet::reward_payee;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;

/// State machine for one gossip connection
pub trait GossipHandler: Send {
    type Item: GossipItem;
    type Outcome: Send + fmt::Debug;

    /// Handle one inbound item
    fn on_message(&mut self, item: Self::Item) -> impl Future<Output = Self::Outcome> + Send;

    /// The connection faulted; the stream is over
    fn on_error(&mut self, error: &PeerError) -> impl Future<Output = ()> + Send;

    /// The remote closed the stream
    fn on_close(&mut self) -> impl Future<Output = ()> + Send;
}

/// A connection's entry in one registry
struct Membership<T: GossipItem> {
    registry: Arc<PeerRegistry<T>>,
    id: Option<PeerId>,
}

impl<T: GossipItem> Membership<T> {
    fn new(registry: Arc<PeerRegistry<T>>, id: PeerId) -> Self {
        Self {
            registry,
            id: Some(id),
        }
    }

    fn id(&self) -> Option<PeerId> {
        self.id
    }

    /// Deregister, at most once
    async fn release(&mut self) -> bool {
        match self.id.take() {
            Some(id) => self.registry.deregister(id).await,
            None => false,
        }
    }
}

impl<T: GossipItem> Drop for Membership<T> {
    fn drop(&mut self) {
        // Connection task dropped without reaching close or error
        if let Some(id) = self.id.take() {
            if let Ok(runtime) = Handle::try_current() {
                let registry = Arc::clone(&self.registry);
                runtime.spawn(async move {
                    registry.deregister(id).await;
                });
            }
        }
    }
}

/// Result of handling one inbound transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOutcome {
    /// Peers the transaction was queued for
    pub relayed: usize,
    /// Whether an internally mined block was accepted, if one was mined
    pub mined: Option<bool>,
}

/// Transaction gossip for one connection
///
/// Every inbound transaction is relayed to all attached peers, the sender
/// included. If the network's difficulty is low enough the node also mines
/// a block holding a reward and the transaction, and offers it to the
/// ledger.
pub struct TransactionGossip {
    state: Arc<ServiceState>,
    membership: Membership<Transaction>,
}

impl TransactionGossip {
    pub(crate) fn new(state: Arc<ServiceState>, id: PeerId) -> Self {
        let membership = Membership::new(Arc::clone(&state.transaction_peers), id);
        Self { state, membership }
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        self.membership.id()
    }

    async fn mine_with(&self, tx: Transaction) -> Option<bool> {
        let network = tx.network;
        let ledger = match self.state.chains.get(&network) {
            Some(ledger) => Arc::clone(ledger),
            None => {
                log::warn!("Transaction {} is for unserved network {}", tx.id, network);
                return None;
            }
        };

        let snapshot = ledger.snapshot();
        let max_difficulty = network.max_internal_mine_difficulty();
        if max_difficulty < snapshot.difficulty {
            log::debug!(
                "[{}] difficulty {} above internal mining limit {}",
                network,
                snapshot.difficulty,
                max_difficulty
            );
            return None;
        }

        let index = snapshot.latest_block.index + 1;
        let payee = reward_payee(self.state.wallet.as_ref(), network);
        let reward = Transaction::reward(network, &payee, snapshot.reward, index);
        let previous_hash = snapshot.latest_block.hash;
        let difficulty = snapshot.difficulty;
        let miner = Arc::clone(&self.state.miner);

        let appended = tokio::task::spawn_blocking(move || {
            let candidate =
                miner.find_block(network, index, &previous_hash, vec![reward, tx], difficulty);
            ledger.append_block(candidate)
        })
        .await;

        match appended {
            Ok(true) => {
                log::info!("[{}] internally mined block {} accepted", network, index);
                Some(true)
            }
            Ok(false) => {
                log::info!("[{}] internally mined block {} rejected", network, index);
                Some(false)
            }
            Err(e) => {
                log::error!("[{}] mining task failed: {}", network, e);
                None
            }
        }
    }
}

impl GossipHandler for TransactionGossip {
    type Item = Transaction;
    type Outcome = TransactionOutcome;

    async fn on_message(&mut self, tx: Transaction) -> TransactionOutcome {
        log::debug!("Received transaction {} on {}", tx.id, tx.network);

        let relayed = self.state.transaction_peers.broadcast(&tx).await;
        let mined = self.mine_with(tx).await;

        TransactionOutcome { relayed, mined }
    }

    async fn on_error(&mut self, error: &PeerError) {
        log::warn!("Transaction stream faulted: {}", error);
        self.membership.release().await;
    }

    async fn on_close(&mut self) {
        log::debug!("Transaction stream closed");
        self.membership.release().await;
    }
}

/// Result of handling one inbound block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Already held; nothing done
    Duplicate,
    /// The ledger refused it
    Rejected,
    /// Appended and relayed to this many peers
    Accepted { relayed: usize },
    /// The block names a network this node does not serve
    UnknownNetwork,
}

/// Block gossip for one connection
pub struct BlockGossip {
    state: Arc<ServiceState>,
    membership: Membership<Block>,
}

impl BlockGossip {
    pub(crate) fn new(state: Arc<ServiceState>, id: PeerId) -> Self {
        let membership = Membership::new(Arc::clone(&state.block_peers), id);
        Self { state, membership }
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        self.membership.id()
    }
}

impl GossipHandler for BlockGossip {
    type Item = Block;
    type Outcome = BlockOutcome;

    async fn on_message(&mut self, block: Block) -> BlockOutcome {
        let network = block.network;
        let ledger = match self.state.chains.get(&network) {
            Some(ledger) => Arc::clone(ledger),
            None => {
                log::warn!("Block {} is for unserved network {}", block.hash, network);
                return BlockOutcome::UnknownNetwork;
            }
        };

        if ledger.block(&block.hash).is_some() {
            log::debug!("[{}] already have block {}", network, block.hash);
            return BlockOutcome::Duplicate;
        }

        let candidate = block.clone();
        let accepted = match tokio::task::spawn_blocking(move || ledger.append_block(candidate))
            .await
        {
            Ok(accepted) => accepted,
            Err(e) => {
                log::error!("[{}] append task failed: {}", network, e);
                false
            }
        };

        if !accepted {
            log::debug!("[{}] dropped block {}", network, block.hash);
            return BlockOutcome::Rejected;
        }

        let relayed = self.state.block_peers.broadcast(&block).await;
        log::info!(
            "[{}] accepted block {} from gossip, relayed to {} peers",
            network,
            block.index,
            relayed
        );
        BlockOutcome::Accepted { relayed }
    }

    async fn on_error(&mut self, error: &PeerError) {
        log::warn!("Block stream faulted: {}", error);
        self.membership.release().await;
    }

    async fn on_close(&mut self) {
        log::debug!("Block stream closed");
        self.membership.release().await;
    }
}
