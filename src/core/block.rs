//! Block implementation
//!
//! A block carries its position in the chain, a header with the proof of
//! work, and an ordered list of transactions.

use crate::core::params::Network;
use crate::core::transaction::Transaction;
use crate::crypto::{calculate_merkle_root_hex, double_sha256, meets_difficulty};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of transactions per block
pub const MAX_BLOCK_TXS: usize = 10_000;

/// Unix time shared by every genesis block
pub const GENESIS_TIMESTAMP: i64 = 1_514_764_800;

/// Block validation errors
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Too many transactions: {0} (max: {1})")]
    TooManyTransactions(usize, usize),
    #[error("Invalid proof of work")]
    InvalidProofOfWork,
    #[error("Invalid merkle root")]
    InvalidMerkleRoot,
    #[error("Invalid block hash")]
    InvalidBlockHash,
}

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    /// Hash of the previous block, absent only for genesis
    pub previous_hash: Option<String>,
    /// Merkle root of all transaction ids
    pub merkle_root: String,
    pub timestamp: DateTime<Utc>,
    /// Difficulty target (number of leading zero bits required)
    pub difficulty: u32,
    /// Nonce used for proof of work
    pub nonce: u64,
}

/// A block in one network's chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block index, contiguous from 0
    pub index: u64,
    pub network: Network,
    pub header: BlockHeader,
    /// Block hash (cached)
    pub hash: String,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a new unmined block
    pub fn new(
        network: Network,
        index: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> Self {
        let header = BlockHeader {
            version: 1,
            previous_hash: Some(previous_hash),
            merkle_root: Self::calculate_merkle_root(&transactions),
            timestamp: Utc::now(),
            difficulty,
            nonce: 0,
        };

        let mut block = Self {
            index,
            network,
            header,
            hash: String::new(),
            transactions,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// The genesis block of a network
    ///
    /// Built from fixed inputs so every node derives the same hash.
    pub fn genesis(network: Network) -> Self {
        let timestamp = Utc
            .timestamp_opt(GENESIS_TIMESTAMP, 0)
            .single()
            .unwrap_or_default();
        let reward = Transaction::reward_at(network, &network.charity_address(), 0, 0, timestamp);

        let header = BlockHeader {
            version: 1,
            previous_hash: None,
            merkle_root: Self::calculate_merkle_root(std::slice::from_ref(&reward)),
            timestamp,
            difficulty: 0,
            nonce: 0,
        };

        let mut block = Self {
            index: 0,
            network,
            header,
            hash: String::new(),
            transactions: vec![reward],
        };
        block.hash = block.calculate_hash();
        block
    }

    pub fn previous_hash(&self) -> Option<&str> {
        self.header.previous_hash.as_deref()
    }

    /// Hash over position, network and header
    pub fn calculate_hash(&self) -> String {
        let data = format!(
            "{}{}{}{}{}{}{}{}",
            self.network,
            self.index,
            self.header.version,
            self.header.previous_hash.as_deref().unwrap_or(""),
            self.header.merkle_root,
            self.header.timestamp.timestamp(),
            self.header.difficulty,
            self.header.nonce
        );
        hex::encode(double_sha256(data.as_bytes()))
    }

    fn calculate_merkle_root(transactions: &[Transaction]) -> String {
        let ids: Vec<String> = transactions.iter().map(|tx| tx.id.clone()).collect();
        calculate_merkle_root_hex(&ids)
    }

    /// Search nonces until the hash meets the header difficulty
    ///
    /// Returns the number of attempts.
    pub fn mine(&mut self) -> u64 {
        let mut attempts = 0u64;

        loop {
            self.header.nonce = attempts;
            self.hash = self.calculate_hash();
            attempts += 1;

            if self.is_valid_pow() || attempts == u64::MAX {
                return attempts;
            }
        }
    }

    /// Check if the proof of work is valid
    pub fn is_valid_pow(&self) -> bool {
        let hash_bytes = hex::decode(&self.hash).unwrap_or_default();
        meets_difficulty(&hash_bytes, self.header.difficulty)
    }

    pub fn verify_merkle_root(&self) -> bool {
        Self::calculate_merkle_root(&self.transactions) == self.header.merkle_root
    }

    pub fn verify_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    /// Self-contained checks that need no chain context
    pub fn validate(&self) -> Result<(), BlockError> {
        if self.transactions.len() > MAX_BLOCK_TXS {
            return Err(BlockError::TooManyTransactions(
                self.transactions.len(),
                MAX_BLOCK_TXS,
            ));
        }

        if !self.verify_hash() {
            return Err(BlockError::InvalidBlockHash);
        }

        if !self.is_valid_pow() {
            return Err(BlockError::InvalidProofOfWork);
        }

        if !self.verify_merkle_root() {
            return Err(BlockError::InvalidMerkleRoot);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reward(height: u64) -> Transaction {
        Transaction::reward(Network::Test, &Network::Test.charity_address(), 50, height)
    }

    #[test]
    fn test_genesis_is_deterministic() {
        let a = Block::genesis(Network::Test);
        let b = Block::genesis(Network::Test);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.index, 0);
        assert!(a.previous_hash().is_none());
        assert!(a.validate().is_ok());
        assert_ne!(a.hash, Block::genesis(Network::Main).hash);
    }

    #[test]
    fn test_block_mining() {
        let genesis = Block::genesis(Network::Test);
        let mut block = Block::new(Network::Test, 1, genesis.hash.clone(), vec![reward(1)], 8);

        let attempts = block.mine();

        assert!(attempts > 0);
        assert!(block.is_valid_pow());
        assert!(block.validate().is_ok());
        assert_eq!(block.previous_hash(), Some(genesis.hash.as_str()));
    }

    #[test]
    fn test_merkle_root_verification() {
        let mut block = Block::new(Network::Test, 1, "00".repeat(32), vec![reward(1)], 4);
        block.mine();
        assert!(block.verify_merkle_root());

        block.transactions[0].id = "tampered_id".to_string();
        assert!(!block.verify_merkle_root());
        assert!(matches!(block.validate(), Err(BlockError::InvalidMerkleRoot)));
    }

    #[test]
    fn test_block_hash_verification() {
        let mut block = Block::genesis(Network::Main);
        assert!(block.verify_hash());

        block.header.nonce += 1;
        assert!(!block.verify_hash());
        assert!(matches!(block.validate(), Err(BlockError::InvalidBlockHash)));
    }

    #[test]
    fn test_hash_binds_index_and_network() {
        let block = Block::new(Network::Test, 1, "00".repeat(32), vec![reward(1)], 0);
        let mut moved = block.clone();
        moved.index = 2;
        assert_ne!(moved.calculate_hash(), block.hash);

        let mut other_network = block.clone();
        other_network.network = Network::Main;
        assert_ne!(other_network.calculate_hash(), block.hash);
    }
}
