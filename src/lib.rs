//! Peerchain: a multi-network blockchain peer node
//!
//! This crate provides:
//! - Per-network chains (main and test) with proof of work
//! - ECDSA digital signatures (secp256k1) and Base58Check addresses
//! - UTXO-based transactions and Merkle roots
//! - A TCP peer service with block and transaction gossip
//! - Opportunistic mining of gossiped transactions
//! - Catch-up synchronization from other nodes
//!
//! # Example
//!
//! ```rust
//! use peerchain::core::{Blockchain, Ledger, Network, Transaction};
//! use peerchain::mining::{Miner, ProofOfWorkMiner};
//!
//! let chain = Blockchain::with_difficulty(Network::Test, 4);
//! let latest = chain.latest_block();
//!
//! let reward = Transaction::reward(
//!     Network::Test,
//!     &Network::Test.charity_address(),
//!     chain.reward(),
//!     latest.index + 1,
//! );
//! let block = ProofOfWorkMiner.find_block(
//!     Network::Test,
//!     latest.index + 1,
//!     &latest.hash,
//!     vec![reward],
//!     chain.difficulty(),
//! );
//!
//! assert!(chain.append_block(block));
//! assert_eq!(chain.length(), 2);
//! ```

pub mod cli;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod network;
pub mod wallet;

// Re-export commonly used types
pub use core::{Block, Blockchain, Ledger, Network, Transaction};
pub use crypto::KeyPair;
pub use mining::{Miner, ProofOfWorkMiner};
pub use network::{Node, NodeConfig, NodeService};
pub use wallet::{Wallet, WalletStore};
