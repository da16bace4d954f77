//! Core chain types
//!
//! - Networks and their static parameters
//! - Transactions (UTXO model, reward transactions)
//! - Blocks with proof of work
//! - The [`Ledger`] seam and the in-memory [`Blockchain`] behind it

pub mod block;
pub mod blockchain;
pub mod ledger;
pub mod params;
pub mod transaction;

pub use block::{Block, BlockError, BlockHeader, GENESIS_TIMESTAMP, MAX_BLOCK_TXS};
pub use blockchain::{
    Blockchain, BlockchainError, DIFFICULTY_ADJUSTMENT_INTERVAL, MAX_DIFFICULTY,
    TARGET_BLOCK_TIME,
};
pub use ledger::{Ledger, LedgerError, LedgerSnapshot};
pub use params::{Network, NetworkParams, UnknownNetwork};
pub use transaction::{
    Transaction, TransactionBuilder, TransactionError, TransactionInput, TransactionOutput, Utxo,
    REWARD_INPUT_ID,
};
