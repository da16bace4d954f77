//! Cryptographic utilities
//!
//! - SHA-256 hashing and the proof-of-work target check
//! - ECDSA key management (secp256k1) and Base58Check addresses
//! - Merkle roots over transaction ids

pub mod hash;
pub mod keys;
pub mod merkle;

pub use hash::{double_sha256, meets_difficulty, sha256};
pub use keys::{
    decode_address, hash_to_address, public_key_from_hex, public_key_to_address, sign_message,
    verify_signature, KeyError, KeyPair, ADDRESS_HASH_LEN,
};
pub use merkle::{calculate_merkle_root, calculate_merkle_root_hex};
