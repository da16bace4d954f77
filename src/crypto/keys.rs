//! ECDSA key management and addresses
//!
//! Key pairs on secp256k1 plus Base58Check addresses. The address version
//! byte identifies the network an address belongs to.

use rand::rngs::OsRng;
use ripemd::Ripemd160;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::hash::sha256;

/// Length of the hash carried by an address
pub const ADDRESS_HASH_LEN: usize = 20;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Get the public key as a hex string (compressed format)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Address of this key pair under the given version byte
    pub fn address(&self, version: u8) -> String {
        public_key_to_address(&self.public_key, version)
    }

    /// Sign a message hash with the private key
    pub fn sign(&self, message_hash: &[u8]) -> Result<Vec<u8>, KeyError> {
        sign_message(&self.secret_key, message_hash)
    }
}

/// Convert a public key to an address: Base58Check(version || RIPEMD160(SHA256(pubkey)))
pub fn public_key_to_address(public_key: &PublicKey, version: u8) -> String {
    let sha256_hash = sha256(&public_key.serialize());

    let mut ripemd = Ripemd160::new();
    ripemd.update(&sha256_hash);
    let ripemd_hash = ripemd.finalize();

    hash_to_address(version, &ripemd_hash)
}

/// Encode a raw 20-byte hash as a Base58Check address
pub fn hash_to_address(version: u8, hash: &[u8]) -> String {
    let mut address_bytes = Vec::with_capacity(1 + hash.len() + 4);
    address_bytes.push(version);
    address_bytes.extend_from_slice(hash);

    let checksum = checksum(&address_bytes);
    address_bytes.extend_from_slice(&checksum);

    bs58::encode(address_bytes).into_string()
}

/// Decode a Base58Check address into its version byte and hash
pub fn decode_address(address: &str) -> Result<(u8, Vec<u8>), KeyError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| KeyError::InvalidAddress(e.to_string()))?;

    if bytes.len() != 1 + ADDRESS_HASH_LEN + 4 {
        return Err(KeyError::InvalidAddress(format!(
            "expected {} bytes, got {}",
            1 + ADDRESS_HASH_LEN + 4,
            bytes.len()
        )));
    }

    let (body, check) = bytes.split_at(bytes.len() - 4);
    if checksum(body) != check {
        return Err(KeyError::InvalidAddress("checksum mismatch".to_string()));
    }

    Ok((body[0], body[1..].to_vec()))
}

fn checksum(data: &[u8]) -> [u8; 4] {
    let hash = Sha256::digest(Sha256::digest(data));
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// Parse a public key from hex string
pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, KeyError> {
    let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPublicKey)?;
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

fn digest32(message_hash: &[u8]) -> Vec<u8> {
    if message_hash.len() == 32 {
        message_hash.to_vec()
    } else {
        sha256(message_hash)
    }
}

/// Sign a message hash with a secret key
pub fn sign_message(secret_key: &SecretKey, message_hash: &[u8]) -> Result<Vec<u8>, KeyError> {
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(&digest32(message_hash))?;
    let signature = secp.sign_ecdsa(&message, secret_key);
    Ok(signature.serialize_compact().to_vec())
}

/// Verify a signature against a public key
pub fn verify_signature(
    public_key: &PublicKey,
    message_hash: &[u8],
    signature: &[u8],
) -> Result<bool, KeyError> {
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(&digest32(message_hash))?;
    let sig = secp256k1::ecdsa::Signature::from_compact(signature)
        .map_err(|_| KeyError::InvalidSignature)?;

    Ok(secp.verify_ecdsa(&message, &sig, public_key).is_ok())
}
