//! Wire types for the peer RPC surface
//!
//! Four unary calls (welcome, block, partial chain, UTXOs) and two gossip
//! streams (transactions, blocks), all carried as [`Frame`]s.

use crate::core::{Block, Network, Transaction, Utxo};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Magic bytes for message framing
pub const MAGIC: [u8; 4] = [0x50, 0x43, 0x48, 0x4E]; // "PCHN"

/// Largest accepted frame payload
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// What kind of software is greeting us
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerType {
    Node,
    Wallet,
    Miner,
}

impl fmt::Display for PeerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerType::Node => f.write_str("node"),
            PeerType::Wallet => f.write_str("wallet"),
            PeerType::Miner => f.write_str("miner"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeRequest {
    pub peer_type: PeerType,
}

/// Snapshot of one network at response time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeModel {
    pub network: Network,
    /// Server time, unix seconds
    pub timestamp: i64,
    pub difficulty: u32,
    pub reward: u64,
    pub latest_block: Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeResponse {
    pub version: u32,
    pub welcomes: Vec<WelcomeModel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRequest {
    pub network: Network,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockResponse {
    pub network: Network,
    pub block: Block,
}

/// Inclusive index range of one network's chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialChainRequest {
    pub network: Network,
    pub start_index: u64,
    pub end_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialChainResponse {
    pub network: Network,
    /// Ascending by index
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoRequest {
    pub network: Network,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoResponse {
    pub network: Network,
    pub utxos: Vec<Utxo>,
}

/// Unary calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Welcome(WelcomeRequest),
    GetBlock(BlockRequest),
    GetPartialChain(PartialChainRequest),
    GetUtxos(UtxoRequest),
}

/// Successful unary replies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Welcome(WelcomeResponse),
    Block(BlockResponse),
    PartialChain(PartialChainResponse),
    Utxos(UtxoResponse),
}

/// Failure of a unary call, sent to the caller in place of a response
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Ledger error: {0}")]
    Ledger(String),
    #[error("Network {0} is not served by this node")]
    UnknownNetwork(Network),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Everything that travels over a peer connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Request(Request),
    Response(Response),
    Error(RpcError),
    /// Turn this connection into the transaction gossip stream
    OpenTransactionStream,
    /// Turn this connection into the block gossip stream
    OpenBlockStream,
    Transaction(Transaction),
    Block(Block),
}

impl Frame {
    /// Serialize frame to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize frame from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Get frame type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Frame::Request(Request::Welcome(_)) => "Welcome",
            Frame::Request(Request::GetBlock(_)) => "GetBlock",
            Frame::Request(Request::GetPartialChain(_)) => "GetPartialChain",
            Frame::Request(Request::GetUtxos(_)) => "GetUtxos",
            Frame::Response(_) => "Response",
            Frame::Error(_) => "Error",
            Frame::OpenTransactionStream => "OpenTransactionStream",
            Frame::OpenBlockStream => "OpenBlockStream",
            Frame::Transaction(_) => "Transaction",
            Frame::Block(_) => "Block",
        }
    }
}

/// Payload type of a gossip stream
pub trait GossipItem: Clone + Send + Sync + Sized + 'static {
    /// Name of the gossip channel, for logs
    const CHANNEL: &'static str;

    fn into_frame(self) -> Frame;

    fn from_frame(frame: Frame) -> Result<Self, Frame>;
}

impl GossipItem for Transaction {
    const CHANNEL: &'static str = "transactions";

    fn into_frame(self) -> Frame {
        Frame::Transaction(self)
    }

    fn from_frame(frame: Frame) -> Result<Self, Frame> {
        match frame {
            Frame::Transaction(tx) => Ok(tx),
            other => Err(other),
        }
    }
}

impl GossipItem for Block {
    const CHANNEL: &'static str = "blocks";

    fn into_frame(self) -> Frame {
        Frame::Block(self)
    }

    fn from_frame(frame: Frame) -> Result<Self, Frame> {
        match frame {
            Frame::Block(block) => Ok(block),
            other => Err(other),
        }
    }
}
