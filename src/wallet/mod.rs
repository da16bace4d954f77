//! Wallet used for internal mining rewards

pub mod wallet;

pub use wallet::{reward_payee, Wallet, WalletError, WalletStore};
