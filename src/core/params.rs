//! Network identities and their static parameters
//!
//! A node can serve several independent chains at once. Each one is named by
//! a [`Network`] and carries a fixed set of [`NetworkParams`].

use crate::crypto::{hash_to_address, ADDRESS_HASH_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Static parameters of one network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkParams {
    /// Highest ledger difficulty at which the node still mines internally
    pub max_internal_mine_difficulty: u32,
    /// Difficulty of block 1 (leading zero bits)
    pub initial_difficulty: u32,
    /// Reward paid by a reward transaction
    pub block_reward: u64,
    /// Base58Check version byte for addresses on this network
    pub address_version: u8,
    /// Hash behind the charity address
    pub charity_hash: [u8; ADDRESS_HASH_LEN],
}

const MAIN_PARAMS: NetworkParams = NetworkParams {
    max_internal_mine_difficulty: 12,
    initial_difficulty: 16,
    block_reward: 50,
    address_version: 0x00,
    charity_hash: [
        0x43, 0x68, 0x61, 0x72, 0x69, 0x74, 0x79, 0x2d, 0x6d, 0x61, 0x69, 0x6e, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x01,
    ],
};

const TEST_PARAMS: NetworkParams = NetworkParams {
    max_internal_mine_difficulty: 8,
    initial_difficulty: 6,
    block_reward: 50,
    address_version: 0x6f,
    charity_hash: [
        0x43, 0x68, 0x61, 0x72, 0x69, 0x74, 0x79, 0x2d, 0x74, 0x65, 0x73, 0x74, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x02,
    ],
};

/// Identity of one independent chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Test,
}

impl Network {
    /// Every network this crate knows about
    pub const ALL: [Network; 2] = [Network::Main, Network::Test];

    pub fn params(self) -> &'static NetworkParams {
        match self {
            Network::Main => &MAIN_PARAMS,
            Network::Test => &TEST_PARAMS,
        }
    }

    pub fn max_internal_mine_difficulty(self) -> u32 {
        self.params().max_internal_mine_difficulty
    }

    pub fn address_version(self) -> u8 {
        self.params().address_version
    }

    /// Payee for internal mining rewards when no wallet is loaded
    pub fn charity_address(self) -> String {
        hash_to_address(self.address_version(), &self.params().charity_hash)
    }

    pub fn name(self) -> &'static str {
        match self {
            Network::Main => "main",
            Network::Test => "test",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown network: {0}")]
pub struct UnknownNetwork(pub String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "main" | "mainnet" => Ok(Network::Main),
            "test" | "testnet" => Ok(Network::Test),
            other => Err(UnknownNetwork(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::decode_address;

    #[test]
    fn test_charity_address_belongs_to_its_network() {
        for network in Network::ALL {
            let (version, _) = decode_address(&network.charity_address()).unwrap();
            assert_eq!(version, network.address_version());
        }
        assert_ne!(
            Network::Main.charity_address(),
            Network::Test.charity_address()
        );
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("main".parse::<Network>().unwrap(), Network::Main);
        assert_eq!(" TestNet ".parse::<Network>().unwrap(), Network::Test);
        assert!("regtest".parse::<Network>().is_err());
        assert_eq!(Network::Test.to_string(), "test");
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Network::Main).unwrap(), "\"main\"");
        let parsed: Network = serde_json::from_str("\"test\"").unwrap();
        assert_eq!(parsed, Network::Test);
    }
}
