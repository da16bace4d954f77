//! Node wallet
//!
//! The node holds at most one key pair, loaded once at startup. It is only
//! used to decide who gets paid for internally mined blocks.

use crate::core::Network;
use crate::crypto::KeyPair;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] crate::crypto::KeyError),
    #[error("Wallet has no key pair")]
    NoKeyPair,
    #[error("Wallet file already exists: {0}")]
    AlreadyExists(PathBuf),
}

/// Source of the payee address for internal mining rewards
pub trait WalletStore: Send + Sync {
    fn has_keypair(&self) -> bool;

    /// Address of the loaded key pair on a network
    fn address_for(&self, network: Network) -> Option<String>;
}

/// Serializable wallet data for persistence
#[derive(Debug, Serialize, Deserialize)]
struct WalletData {
    private_key_hex: String,
    label: Option<String>,
}

/// A wallet that may or may not hold a key pair
#[derive(Clone, Default)]
pub struct Wallet {
    key_pair: Option<KeyPair>,
    pub label: Option<String>,
}

impl Wallet {
    /// A wallet without keys; rewards go to charity
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a wallet with a fresh key pair
    pub fn generate(label: Option<&str>) -> Self {
        Self {
            key_pair: Some(KeyPair::generate()),
            label: label.map(str::to_string),
        }
    }

    /// Import a wallet from a private key
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, WalletError> {
        Ok(Self {
            key_pair: Some(KeyPair::from_private_key_hex(private_key_hex)?),
            label: None,
        })
    }

    /// Open the wallet at `path`
    ///
    /// A missing file yields an empty wallet. A file that exists but cannot
    /// be decoded is an error.
    pub fn open(path: &Path) -> Result<Self, WalletError> {
        if !path.exists() {
            log::warn!(
                "No wallet found at {}; internal mining rewards will go to charity. \
                 Generate a wallet to keep your own rewards.",
                path.display()
            );
            return Ok(Self::empty());
        }

        let wallet = Self::load(path)?;
        log::info!("Loaded wallet from {}", path.display());
        Ok(wallet)
    }

    /// Load wallet from file
    pub fn load(path: &Path) -> Result<Self, WalletError> {
        let json = fs::read_to_string(path)?;
        let data: WalletData = serde_json::from_str(&json)?;

        let mut wallet = Self::from_private_key(&data.private_key_hex)?;
        wallet.label = data.label;
        Ok(wallet)
    }

    /// Save wallet to a new file
    pub fn save(&self, path: &Path) -> Result<(), WalletError> {
        let key_pair = self.key_pair.as_ref().ok_or(WalletError::NoKeyPair)?;
        if path.exists() {
            return Err(WalletError::AlreadyExists(path.to_path_buf()));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = WalletData {
            private_key_hex: key_pair.private_key_hex(),
            label: self.label.clone(),
        };
        fs::write(path, serde_json::to_string_pretty(&data)?)?;
        Ok(())
    }

    pub fn key_pair(&self) -> Option<&KeyPair> {
        self.key_pair.as_ref()
    }
}

impl WalletStore for Wallet {
    fn has_keypair(&self) -> bool {
        self.key_pair.is_some()
    }

    fn address_for(&self, network: Network) -> Option<String> {
        self.key_pair
            .as_ref()
            .map(|kp| kp.address(network.address_version()))
    }
}

/// Payee for an internally mined block on `network`
pub fn reward_payee(wallet: &dyn WalletStore, network: Network) -> String {
    if wallet.has_keypair() {
        if let Some(address) = wallet.address_for(network) {
            return address;
        }
    }
    network.charity_address()
}
