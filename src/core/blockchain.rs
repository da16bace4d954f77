//! In-memory ledger
//!
//! Keeps one network's blocks, a hash index and the derived UTXO set behind
//! a single lock, so check-and-append is atomic.

use crate::core::block::{Block, BlockError};
use crate::core::ledger::{Ledger, LedgerError, LedgerSnapshot};
use crate::core::params::Network;
use crate::core::transaction::{outpoint, Transaction, TransactionError, Utxo};
use crate::crypto::{decode_address, public_key_from_hex, public_key_to_address};
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Number of blocks between difficulty adjustments
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;

/// Target block time in seconds
pub const TARGET_BLOCK_TIME: i64 = 10;

/// Upper bound for retargeting
pub const MAX_DIFFICULTY: u32 = 32;

/// Reasons a candidate block is refused
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Invalid transaction {id}: {reason}")]
    InvalidTransaction { id: String, reason: String },
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error("Duplicate block")]
    DuplicateBlock,
}

impl BlockchainError {
    fn tx(tx: &Transaction, reason: impl Into<String>) -> Self {
        BlockchainError::InvalidTransaction {
            id: tx.id.clone(),
            reason: reason.into(),
        }
    }

    fn from_tx(tx: &Transaction, err: TransactionError) -> Self {
        Self::tx(tx, err.to_string())
    }
}

#[derive(Debug)]
struct ChainState {
    blocks: Vec<Block>,
    by_hash: HashMap<String, usize>,
    difficulty: u32,
    utxo_set: HashMap<String, Utxo>,
}

/// One network's chain held in memory
#[derive(Debug)]
pub struct Blockchain {
    network: Network,
    reward: u64,
    state: RwLock<ChainState>,
}

impl Blockchain {
    /// Chain with only the genesis block, at the network's initial difficulty
    pub fn new(network: Network) -> Self {
        Self::with_difficulty(network, network.params().initial_difficulty)
    }

    /// Chain with a custom starting difficulty
    pub fn with_difficulty(network: Network, difficulty: u32) -> Self {
        let genesis = Block::genesis(network);
        let mut state = ChainState {
            blocks: Vec::new(),
            by_hash: HashMap::new(),
            difficulty,
            utxo_set: HashMap::new(),
        };
        state.push(genesis);

        Self {
            network,
            reward: network.params().block_reward,
            state: RwLock::new(state),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ChainState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChainState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Index of the latest block
    pub fn height(&self) -> u64 {
        self.read().blocks.len() as u64 - 1
    }

    /// Block at a given index
    pub fn block_at(&self, index: u64) -> Option<Block> {
        self.read().blocks.get(index as usize).cloned()
    }

    /// Validate and append a block
    pub fn add_block(&self, block: Block) -> Result<(), BlockchainError> {
        let mut state = self.write();

        if state.by_hash.contains_key(&block.hash) {
            return Err(BlockchainError::DuplicateBlock);
        }

        self.validate_block(&state, &block)?;

        let index = block.index;
        let hash = block.hash.clone();
        state.push(block);

        if (index + 1) % DIFFICULTY_ADJUSTMENT_INTERVAL == 0 {
            state.adjust_difficulty();
        }

        log::info!(
            "[{}] appended block {} ({}), length {}",
            self.network,
            index,
            hash,
            state.blocks.len()
        );
        Ok(())
    }

    fn validate_block(&self, state: &ChainState, block: &Block) -> Result<(), BlockchainError> {
        let latest = state.latest();

        if block.network != self.network {
            return Err(BlockchainError::InvalidBlock(format!(
                "block for network {} offered to {}",
                block.network, self.network
            )));
        }

        if block.index != latest.index + 1 {
            return Err(BlockchainError::InvalidBlock(format!(
                "Invalid index: expected {}, got {}",
                latest.index + 1,
                block.index
            )));
        }

        if block.previous_hash() != Some(latest.hash.as_str()) {
            return Err(BlockchainError::InvalidBlock(
                "Invalid previous hash".to_string(),
            ));
        }

        if block.header.difficulty != state.difficulty {
            return Err(BlockchainError::InvalidBlock(format!(
                "Invalid difficulty: expected {}, got {}",
                state.difficulty, block.header.difficulty
            )));
        }

        block.validate()?;

        self.validate_transactions(state, block)
    }

    fn validate_transactions(
        &self,
        state: &ChainState,
        block: &Block,
    ) -> Result<(), BlockchainError> {
        let mut spent = HashSet::new();

        for (position, tx) in block.transactions.iter().enumerate() {
            if tx.network != self.network {
                return Err(BlockchainError::tx(tx, "wrong network"));
            }

            tx.check_structure()
                .map_err(|e| BlockchainError::from_tx(tx, e))?;

            for output in &tx.outputs {
                self.check_address(&output.recipient)
                    .map_err(|e| BlockchainError::tx(tx, e.to_string()))?;
            }

            if tx.is_reward {
                if position != 0 {
                    return Err(BlockchainError::tx(tx, "reward must be the first transaction"));
                }
                if tx.total_output() > self.reward {
                    return Err(BlockchainError::tx(
                        tx,
                        format!("reward {} exceeds {}", tx.total_output(), self.reward),
                    ));
                }
                if u64::from(tx.inputs[0].output_index) != block.index {
                    return Err(BlockchainError::tx(tx, "reward height does not match block"));
                }
                continue;
            }

            let mut input_total = 0u64;
            for input in &tx.inputs {
                let key = outpoint(&input.tx_id, input.output_index);
                if !spent.insert(key.clone()) {
                    return Err(BlockchainError::tx(tx, format!("double spend of {}", key)));
                }

                let utxo = state
                    .utxo_set
                    .get(&key)
                    .ok_or_else(|| BlockchainError::tx(tx, format!("unknown output {}", key)))?;

                let public_key = public_key_from_hex(&input.public_key)
                    .map_err(|e| BlockchainError::tx(tx, e.to_string()))?;
                let signer = public_key_to_address(&public_key, self.network.address_version());
                if signer != utxo.output.recipient {
                    return Err(BlockchainError::tx(tx, format!("{} not owned by signer", key)));
                }

                input_total = input_total.saturating_add(utxo.output.amount);
            }

            if tx.total_output() > input_total {
                return Err(BlockchainError::tx(
                    tx,
                    format!("outputs {} exceed inputs {}", tx.total_output(), input_total),
                ));
            }
        }

        Ok(())
    }

    fn check_address(&self, address: &str) -> Result<(), LedgerError> {
        let (version, _) =
            decode_address(address).map_err(|e| LedgerError::InvalidAddress(e.to_string()))?;

        if version != self.network.address_version() {
            return Err(LedgerError::InvalidNetwork {
                address: address.to_string(),
                expected: self.network,
            });
        }
        Ok(())
    }
}

impl ChainState {
    fn latest(&self) -> &Block {
        // The genesis block is pushed at construction and never removed.
        &self.blocks[self.blocks.len() - 1]
    }

    fn push(&mut self, block: Block) {
        for tx in &block.transactions {
            if !tx.is_reward {
                for input in &tx.inputs {
                    self.utxo_set
                        .remove(&outpoint(&input.tx_id, input.output_index));
                }
            }

            for (index, output) in tx.outputs.iter().enumerate() {
                let utxo = Utxo {
                    tx_id: tx.id.clone(),
                    output_index: index as u32,
                    output: output.clone(),
                };
                self.utxo_set.insert(utxo.outpoint(), utxo);
            }
        }

        self.by_hash.insert(block.hash.clone(), self.blocks.len());
        self.blocks.push(block);
    }

    fn adjust_difficulty(&mut self) {
        let interval = DIFFICULTY_ADJUSTMENT_INTERVAL as usize;
        if self.blocks.len() <= interval {
            return;
        }

        let first = &self.blocks[self.blocks.len() - 1 - interval];
        let last = self.latest();
        let time_taken = last
            .header
            .timestamp
            .signed_duration_since(first.header.timestamp)
            .num_seconds();
        let expected_time = TARGET_BLOCK_TIME * DIFFICULTY_ADJUSTMENT_INTERVAL as i64;

        let previous = self.difficulty;
        if time_taken < expected_time / 2 {
            self.difficulty = self.difficulty.saturating_add(1).min(MAX_DIFFICULTY);
        } else if time_taken > expected_time * 2 {
            self.difficulty = self.difficulty.saturating_sub(1).max(1);
        }

        if previous != self.difficulty {
            log::info!(
                "Difficulty adjusted from {} to {} (time taken: {}s, expected: {}s)",
                previous,
                self.difficulty,
                time_taken,
                expected_time
            );
        }
    }
}

impl Ledger for Blockchain {
    fn network(&self) -> Network {
        self.network
    }

    fn latest_block(&self) -> Block {
        self.read().latest().clone()
    }

    fn block(&self, hash: &str) -> Option<Block> {
        let state = self.read();
        state
            .by_hash
            .get(hash)
            .and_then(|&index| state.blocks.get(index))
            .cloned()
    }

    fn length(&self) -> u64 {
        self.read().blocks.len() as u64
    }

    fn difficulty(&self) -> u32 {
        self.read().difficulty
    }

    fn reward(&self) -> u64 {
        self.reward
    }

    fn utxos_for_address(&self, address: &str) -> Result<Vec<Utxo>, LedgerError> {
        self.check_address(address)?;

        let mut utxos: Vec<Utxo> = self
            .read()
            .utxo_set
            .values()
            .filter(|utxo| utxo.output.recipient == address)
            .cloned()
            .collect();
        utxos.sort_by(|a, b| a.outpoint().cmp(&b.outpoint()));
        Ok(utxos)
    }

    fn append_block(&self, candidate: Block) -> bool {
        let index = candidate.index;
        match self.add_block(candidate) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("[{}] rejected block {}: {}", self.network, index, e);
                false
            }
        }
    }

    fn snapshot(&self) -> LedgerSnapshot {
        let state = self.read();
        LedgerSnapshot {
            difficulty: state.difficulty,
            reward: self.reward,
            latest_block: state.latest().clone(),
            length: state.blocks.len() as u64,
        }
    }
}
