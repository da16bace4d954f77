//! The ledger seen by the peer layer
//!
//! Storage, validation and UTXO indexing live behind [`Ledger`]. The peer
//! layer reads snapshots and performs exactly one mutation: appending a
//! candidate block.

use crate::core::block::Block;
use crate::core::params::Network;
use crate::core::transaction::Utxo;
use thiserror::Error;

/// Errors a ledger reports to query callers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Address {address} does not belong to network {expected}")]
    InvalidNetwork { address: String, expected: Network },
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Consistent view of a ledger at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub difficulty: u32,
    pub reward: u64,
    pub latest_block: Block,
    /// Number of blocks held
    pub length: u64,
}

/// Per-network append-only chain plus its derived UTXO set
pub trait Ledger: Send + Sync {
    fn network(&self) -> Network;

    fn latest_block(&self) -> Block;

    /// Block with the given hash, if held
    fn block(&self, hash: &str) -> Option<Block>;

    /// Number of blocks held
    fn length(&self) -> u64;

    fn difficulty(&self) -> u32;

    fn reward(&self) -> u64;

    fn utxos_for_address(&self, address: &str) -> Result<Vec<Utxo>, LedgerError>;

    /// Validate and append a candidate block
    ///
    /// Among concurrent candidates for the same index at most one is
    /// accepted.
    fn append_block(&self, candidate: Block) -> bool;

    fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            difficulty: self.difficulty(),
            reward: self.reward(),
            latest_block: self.latest_block(),
            length: self.length(),
        }
    }
}
