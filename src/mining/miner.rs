//! Proof-of-work search
//!
//! The peer layer asks a [`Miner`] for a block extending a given tip and
//! hands the result to the ledger. The search itself is CPU-bound; async
//! callers run it on the blocking pool.

use crate::core::{Block, Network, Transaction};
use log::info;
use std::time::Instant;

/// Mining statistics
#[derive(Debug, Clone)]
pub struct MiningStats {
    /// Number of hash attempts
    pub hash_attempts: u64,
    /// Time taken in milliseconds
    pub time_ms: u128,
    /// Hash rate (hashes per second)
    pub hash_rate: f64,
}

/// Finds a block satisfying a difficulty for given contents and linkage
pub trait Miner: Send + Sync {
    fn find_block(
        &self,
        network: Network,
        index: u64,
        previous_hash: &str,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> Block;
}

/// Nonce search on the local CPU
#[derive(Debug, Default, Clone, Copy)]
pub struct ProofOfWorkMiner;

impl ProofOfWorkMiner {
    pub fn new() -> Self {
        Self
    }

    /// Mine a block and report how long it took
    pub fn mine(
        &self,
        network: Network,
        index: u64,
        previous_hash: &str,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> (Block, MiningStats) {
        let start = Instant::now();

        let mut block = Block::new(
            network,
            index,
            previous_hash.to_string(),
            transactions,
            difficulty,
        );

        info!(
            "[{}] mining block {} with difficulty {}...",
            network, block.index, block.header.difficulty
        );

        let attempts = block.mine();

        let elapsed = start.elapsed().as_millis();
        let hash_rate = if elapsed > 0 {
            (attempts as f64) / (elapsed as f64 / 1000.0)
        } else {
            attempts as f64
        };

        info!(
            "[{}] block {} mined in {}ms ({} attempts, {:.2} H/s)",
            network, block.index, elapsed, attempts, hash_rate
        );

        let stats = MiningStats {
            hash_attempts: attempts,
            time_ms: elapsed,
            hash_rate,
        };

        (block, stats)
    }
}

impl Miner for ProofOfWorkMiner {
    fn find_block(
        &self,
        network: Network,
        index: u64,
        previous_hash: &str,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> Block {
        self.mine(network, index, previous_hash, transactions, difficulty)
            .0
    }
}
