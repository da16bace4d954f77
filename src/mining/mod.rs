//! Block production

pub mod miner;

pub use miner::{Miner, MiningStats, ProofOfWorkMiner};
