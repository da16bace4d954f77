//! Peer registries for the gossip channels
//!
//! Each gossip channel keeps the set of currently attached peers. A peer is
//! represented by a [`PeerHandle`], the sending half of a bounded queue that
//! the connection's writer task drains. Broadcasting never waits on a peer:
//! a full queue drops the message for that peer only.

use crate::network::message::GossipItem;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

/// Default capacity of a peer's outbound queue
pub const DEFAULT_PEER_QUEUE: usize = 256;

/// Peer connection errors
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Peer disconnected")]
    Disconnected,
    #[error("Unexpected {0} frame")]
    UnexpectedFrame(&'static str),
}

/// Registry-local identifier of an attached peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Handle for sending gossip to one peer
pub struct PeerHandle<T> {
    pub id: PeerId,
    pub addr: Option<SocketAddr>,
    tx: mpsc::Sender<T>,
}

impl<T> Clone for PeerHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            addr: self.addr,
            tx: self.tx.clone(),
        }
    }
}

impl<T> PeerHandle<T> {
    /// Queue a message without waiting
    pub fn try_send(&self, msg: T) -> Result<(), TrySendError<T>> {
        self.tx.try_send(msg)
    }

    fn label(&self) -> String {
        match self.addr {
            Some(addr) => format!("{} ({})", self.id, addr),
            None => self.id.to_string(),
        }
    }
}

/// Live set of peers attached to one gossip channel
pub struct PeerRegistry<T> {
    next_id: AtomicU64,
    peers: RwLock<HashMap<PeerId, PeerHandle<T>>>,
    _item: PhantomData<fn(T)>,
}

impl<T: GossipItem> PeerRegistry<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            peers: RwLock::new(HashMap::new()),
            _item: PhantomData,
        }
    }

    /// Attach a peer's outbound queue
    pub async fn enroll(&self, addr: Option<SocketAddr>, tx: mpsc::Sender<T>) -> PeerId {
        let id = PeerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = PeerHandle { id, addr, tx };
        let label = handle.label();

        let mut peers = self.peers.write().await;
        peers.insert(id, handle);

        log::info!(
            "Enrolled {} on {} channel ({} attached)",
            label,
            T::CHANNEL,
            peers.len()
        );
        id
    }

    /// Detach a peer; returns whether it was attached
    pub async fn deregister(&self, id: PeerId) -> bool {
        let mut peers = self.peers.write().await;
        let removed = peers.remove(&id);

        if let Some(handle) = &removed {
            log::info!(
                "Removed {} from {} channel ({} attached)",
                handle.label(),
                T::CHANNEL,
                peers.len()
            );
        }
        removed.is_some()
    }

    /// Queue `msg` for every attached peer
    ///
    /// Returns how many peers accepted the message.
    pub async fn broadcast(&self, msg: &T) -> usize {
        let handles: Vec<PeerHandle<T>> = {
            let peers = self.peers.read().await;
            peers.values().cloned().collect()
        };

        let mut delivered = 0;
        for handle in handles {
            match handle.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    log::warn!(
                        "Outbound {} queue of {} is full, dropping message",
                        T::CHANNEL,
                        handle.label()
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    log::debug!("{} already closed, skipping", handle.label());
                }
            }
        }
        delivered
    }

    /// Number of attached peers
    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    pub async fn contains(&self, id: PeerId) -> bool {
        self.peers.read().await.contains_key(&id)
    }
}

impl<T: GossipItem> Default for PeerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
