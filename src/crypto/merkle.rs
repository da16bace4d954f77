//! Merkle root over transaction ids

use super::hash::sha256;

/// Calculate the merkle root from a list of leaf hashes
///
/// Odd levels duplicate their last hash. An empty list hashes the empty string.
pub fn calculate_merkle_root(hashes: &[Vec<u8>]) -> Vec<u8> {
    if hashes.is_empty() {
        return sha256(b"");
    }

    let mut current_level: Vec<Vec<u8>> = hashes.to_vec();

    while current_level.len() > 1 {
        current_level = current_level
            .chunks(2)
            .map(|chunk| {
                let mut data = chunk[0].clone();
                data.extend_from_slice(chunk.get(1).unwrap_or(&chunk[0]));
                sha256(&data)
            })
            .collect();
    }

    current_level.remove(0)
}

/// Calculate merkle root from hex-encoded hashes
///
/// Entries that are not valid hex are hashed as raw bytes so that a
/// tampered id still changes the root.
pub fn calculate_merkle_root_hex(hex_hashes: &[String]) -> String {
    let hashes: Vec<Vec<u8>> = hex_hashes
        .iter()
        .map(|h| hex::decode(h).unwrap_or_else(|_| sha256(h.as_bytes())))
        .collect();
    hex::encode(calculate_merkle_root(&hashes))
}
