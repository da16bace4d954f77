//! Transactions in the UTXO model
//!
//! A transaction is either a value transfer, which spends existing outputs
//! and creates new ones, or a reward transaction, which only creates outputs.

use crate::core::params::Network;
use crate::crypto::{public_key_from_hex, sha256, verify_signature, KeyPair};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder previous-output id carried by the marker input of a reward
pub const REWARD_INPUT_ID: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Transaction-related errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] crate::crypto::KeyError),
}

/// Transaction input (reference to previous output)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionInput {
    /// Transaction ID of the previous transaction
    pub tx_id: String,
    /// Index of the output in the previous transaction
    pub output_index: u32,
    /// Signature proving ownership
    pub signature: String,
    /// Public key of the sender (for verification)
    pub public_key: String,
}

/// Transaction output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionOutput {
    pub amount: u64,
    /// Recipient's address
    pub recipient: String,
}

/// Unspent transaction output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Utxo {
    pub tx_id: String,
    pub output_index: u32,
    pub output: TransactionOutput,
}

impl Utxo {
    /// Key under which the ledger indexes this output
    pub fn outpoint(&self) -> String {
        outpoint(&self.tx_id, self.output_index)
    }
}

pub(crate) fn outpoint(tx_id: &str, output_index: u32) -> String {
    format!("{}:{}", tx_id, output_index)
}

/// A transaction bound to one network
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    /// Hash of the transaction contents
    pub id: String,
    pub network: Network,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub timestamp: DateTime<Utc>,
    /// Reward (coinbase) transactions create outputs without spending any
    pub is_reward: bool,
}

impl Transaction {
    /// Create a new unsigned transfer
    pub fn new(
        network: Network,
        inputs: Vec<TransactionInput>,
        outputs: Vec<TransactionOutput>,
    ) -> Self {
        let mut tx = Self {
            id: String::new(),
            network,
            inputs,
            outputs,
            timestamp: Utc::now(),
            is_reward: false,
        };
        tx.id = tx.calculate_hash();
        tx
    }

    /// Create a reward transaction paying `amount` to `payee`
    ///
    /// The marker input carries the height of the block the reward is meant
    /// for, which keeps reward ids unique across blocks.
    pub fn reward(network: Network, payee: &str, amount: u64, height: u64) -> Self {
        Self::reward_at(network, payee, amount, height, Utc::now())
    }

    pub(crate) fn reward_at(
        network: Network,
        payee: &str,
        amount: u64,
        height: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self {
            id: String::new(),
            network,
            inputs: vec![TransactionInput {
                tx_id: REWARD_INPUT_ID.to_string(),
                output_index: height as u32,
                signature: String::new(),
                public_key: String::new(),
            }],
            outputs: vec![TransactionOutput {
                amount,
                recipient: payee.to_string(),
            }],
            timestamp,
            is_reward: true,
        };
        tx.id = tx.calculate_hash();
        tx
    }

    /// Calculate the transaction hash
    pub fn calculate_hash(&self) -> String {
        let inputs: Vec<(&str, u32, &str, &str)> = self
            .inputs
            .iter()
            .map(|i| {
                (
                    i.tx_id.as_str(),
                    i.output_index,
                    i.signature.as_str(),
                    i.public_key.as_str(),
                )
            })
            .collect();
        let data = format!(
            "{}{:?}{:?}{}{}",
            self.network,
            inputs,
            self.outputs,
            self.timestamp.timestamp_nanos_opt().unwrap_or_default(),
            self.is_reward
        );
        hex::encode(sha256(data.as_bytes()))
    }

    /// Data covered by input signatures
    pub fn signing_data(&self) -> Vec<u8> {
        let outpoints: Vec<(&str, u32)> = self
            .inputs
            .iter()
            .map(|i| (i.tx_id.as_str(), i.output_index))
            .collect();
        let data = format!(
            "{}{:?}{:?}{}{}",
            self.network,
            outpoints,
            self.outputs,
            self.timestamp.timestamp_nanos_opt().unwrap_or_default(),
            self.is_reward
        );
        sha256(data.as_bytes())
    }

    /// Sign all inputs with the provided key pair
    pub fn sign(&mut self, key_pair: &KeyPair) -> Result<(), TransactionError> {
        let signing_data = self.signing_data();
        let public_key_hex = key_pair.public_key_hex();

        for input in &mut self.inputs {
            let signature = key_pair.sign(&signing_data)?;
            input.signature = hex::encode(&signature);
            input.public_key = public_key_hex.clone();
        }

        self.id = self.calculate_hash();
        Ok(())
    }

    /// Verify all input signatures
    pub fn verify_signatures(&self) -> Result<bool, TransactionError> {
        if self.is_reward {
            return Ok(true);
        }

        let signing_data = self.signing_data();

        for input in &self.inputs {
            if input.signature.is_empty() || input.public_key.is_empty() {
                return Ok(false);
            }

            let public_key = public_key_from_hex(&input.public_key)?;
            let signature =
                hex::decode(&input.signature).map_err(|_| TransactionError::InvalidSignature)?;

            if !verify_signature(&public_key, &signing_data, &signature)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Get total output amount
    pub fn total_output(&self) -> u64 {
        self.outputs
            .iter()
            .fold(0u64, |acc, o| acc.saturating_add(o.amount))
    }

    /// Context-free checks: id, shape and signatures
    pub fn check_structure(&self) -> Result<(), TransactionError> {
        if self.id != self.calculate_hash() {
            return Err(TransactionError::InvalidTransaction(
                "id does not match contents".to_string(),
            ));
        }

        if self.outputs.is_empty() {
            return Err(TransactionError::InvalidTransaction(
                "no outputs".to_string(),
            ));
        }

        if self.is_reward {
            let marker_only = self.inputs.len() == 1 && self.inputs[0].tx_id == REWARD_INPUT_ID;
            if !marker_only {
                return Err(TransactionError::InvalidTransaction(
                    "reward transactions cannot spend outputs".to_string(),
                ));
            }
            return Ok(());
        }

        if self.inputs.is_empty() {
            return Err(TransactionError::InvalidTransaction(
                "transfer without inputs".to_string(),
            ));
        }

        if self.outputs.iter().any(|o| o.amount == 0) {
            return Err(TransactionError::InvalidTransaction(
                "zero-value output".to_string(),
            ));
        }

        if !self.verify_signatures()? {
            return Err(TransactionError::InvalidSignature);
        }

        Ok(())
    }
}

/// Builder for signed transfers
pub struct TransactionBuilder {
    network: Network,
    inputs: Vec<TransactionInput>,
    outputs: Vec<TransactionOutput>,
}

impl TransactionBuilder {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Spend a UTXO
    pub fn add_input(mut self, utxo: &Utxo) -> Self {
        self.inputs.push(TransactionInput {
            tx_id: utxo.tx_id.clone(),
            output_index: utxo.output_index,
            signature: String::new(),
            public_key: String::new(),
        });
        self
    }

    pub fn add_output(mut self, recipient: &str, amount: u64) -> Self {
        self.outputs.push(TransactionOutput {
            amount,
            recipient: recipient.to_string(),
        });
        self
    }

    /// Build and sign the transaction
    pub fn build_and_sign(self, key_pair: &KeyPair) -> Result<Transaction, TransactionError> {
        let mut tx = Transaction::new(self.network, self.inputs, self.outputs);
        tx.sign(key_pair)?;
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funding_utxo(owner: &str) -> Utxo {
        Utxo {
            tx_id: "ab".repeat(32),
            output_index: 0,
            output: TransactionOutput {
                amount: 50,
                recipient: owner.to_string(),
            },
        }
    }

    #[test]
    fn test_reward_transaction() {
        let payee = Network::Test.charity_address();
        let tx = Transaction::reward(Network::Test, &payee, 50, 3);

        assert!(tx.is_reward);
        assert_eq!(tx.total_output(), 50);
        assert_eq!(tx.outputs[0].recipient, payee);
        assert_eq!(tx.inputs[0].output_index, 3);
        assert!(tx.check_structure().is_ok());
    }

    #[test]
    fn test_reward_ids_differ_by_height() {
        let payee = Network::Test.charity_address();
        let now = Utc::now();
        let a = Transaction::reward_at(Network::Test, &payee, 50, 1, now);
        let b = Transaction::reward_at(Network::Test, &payee, 50, 2, now);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_signed_transfer_verifies() {
        let kp = KeyPair::generate();
        let owner = kp.address(Network::Test.address_version());

        let tx = TransactionBuilder::new(Network::Test)
            .add_input(&funding_utxo(&owner))
            .add_output("recipient", 30)
            .add_output(&owner, 20)
            .build_and_sign(&kp)
            .unwrap();

        assert!(tx.verify_signatures().unwrap());
        assert!(tx.check_structure().is_ok());
        assert_eq!(tx.total_output(), 50);
    }

    #[test]
    fn test_tampered_transfer_fails() {
        let kp = KeyPair::generate();
        let owner = kp.address(Network::Test.address_version());

        let mut tx = TransactionBuilder::new(Network::Test)
            .add_input(&funding_utxo(&owner))
            .add_output("recipient", 30)
            .build_and_sign(&kp)
            .unwrap();

        tx.outputs[0].amount = 49;
        assert!(!tx.verify_signatures().unwrap());

        tx.id = tx.calculate_hash();
        assert!(matches!(
            tx.check_structure(),
            Err(TransactionError::InvalidSignature)
        ));
    }

    #[test]
    fn test_unsigned_transfer_rejected() {
        let tx = Transaction::new(
            Network::Test,
            vec![TransactionInput {
                tx_id: "cd".repeat(32),
                output_index: 1,
                signature: String::new(),
                public_key: String::new(),
            }],
            vec![TransactionOutput {
                amount: 1,
                recipient: "anyone".to_string(),
            }],
        );
        assert!(tx.check_structure().is_err());
    }

    #[test]
    fn test_serde_keeps_id_valid() {
        let payee = Network::Main.charity_address();
        let tx = Transaction::reward(Network::Main, &payee, 50, 1);
        let json = serde_json::to_string(&tx).unwrap();
        let decoded: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.calculate_hash(), tx.id);
    }
}
