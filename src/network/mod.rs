//! P2P Networking module
//!
//! Serves the ledgers of several networks to peers over TCP.
//!
//! # Features
//! - Unary queries: welcome, block by hash, partial chain, UTXOs
//! - Transaction and block gossip streams with per-peer bounded queues
//! - Opportunistic mining of gossiped transactions
//! - Catch-up synchronization from bootstrap peers

pub mod client;
pub mod gossip;
pub mod message;
pub mod node;
pub mod peer;
pub mod server;
pub mod service;
pub mod sync;

pub use client::{ClientError, GossipStream, PeerClient};
pub use gossip::{BlockGossip, BlockOutcome, GossipHandler, TransactionGossip, TransactionOutcome};
pub use message::{
    BlockRequest, BlockResponse, Frame, GossipItem, PartialChainRequest, PartialChainResponse,
    PeerType, Request, Response, RpcError, UtxoRequest, UtxoResponse, WelcomeModel,
    WelcomeRequest, WelcomeResponse, MAGIC, MAX_FRAME_SIZE, PROTOCOL_VERSION,
};
pub use node::{NetworkStatus, Node, NodeConfig, NodeError, NodeStatus};
pub use peer::{PeerError, PeerHandle, PeerId, PeerRegistry, DEFAULT_PEER_QUEUE};
pub use server::{connect_to_peer, handle_connection, FrameCodec, Server};
pub use service::{ChainSet, NodeService};
pub use sync::{ChainSync, SyncError, SyncReport, SYNC_BATCH_SIZE};
