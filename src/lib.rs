// coinledger: a minimal proof-of-work ledger
//
// This crate contains the core ledger implementation including:
// - Hashing and merkle-root utilities
// - Wallet identities and the wallet store
// - Signed value-transfer transactions
// - Block structure and proof of work
// - The blockchain with pending pool, mining, and verification
//
// Key storage, command loops, and service layers are external
// collaborators that call into this crate.

pub mod block;
pub mod chain;
pub mod hash;
pub mod merkle;
pub mod transaction;
pub mod wallet;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Blockchain, BlockchainError, ChainConfig};
pub use hash::Hash;
pub use transaction::Transaction;
pub use wallet::{DigitalSignature, Wallet, WalletStore, REWARD_HANDLE};
