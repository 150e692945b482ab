use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::hash::{sha256, Hash, HashError};
use super::merkle::merkle_root;
use super::transaction::{Transaction, TransactionError};
use super::wallet::{CryptoError, WalletStore};

/// Errors that can occur during block operations
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Mining was cancelled")]
    Cancelled,

    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),

    #[error("Hash error: {0}")]
    HashError(#[from] HashError),
}

/// An ordered batch of transactions sealed by proof of work
///
/// The transactions are committed under a merkle root, the block is
/// linked to its predecessor by hash, and mining increments the nonce
/// until the block hash meets the difficulty target. Once appended to
/// the chain a block is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Hash of the previous block; absent only for the genesis block
    pub previous_hash: Option<Hash>,

    /// Transactions committed by this block
    pub transactions: Vec<Transaction>,

    /// Timestamp when the block was created
    pub timestamp: DateTime<Utc>,

    /// Merkle root over the transactions' content hashes
    pub merkle_root: Hash,

    /// Nonce incremented during mining
    pub nonce: u32,

    /// Hash of the block under the current nonce
    pub hash: Hash,
}

/// Encodes a timestamp/nonce pair into the fixed-width form used for
/// hashing: timestamp seconds as a little-endian 32-bit float, then the
/// nonce as a little-endian 32-bit integer.
fn encode_seal(timestamp: &DateTime<Utc>, nonce: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&(timestamp.timestamp() as f32).to_le_bytes());
    out[4..].copy_from_slice(&nonce.to_le_bytes());
    out
}

impl Block {
    /// Creates a new block over the given transactions
    ///
    /// Computes the merkle root, starts the nonce at zero, and computes
    /// the initial hash. Construction has no other effects; balances move
    /// only when the block is mined.
    ///
    /// # Arguments
    ///
    /// * `previous_hash` - Hash of the predecessor block, `None` for genesis
    /// * `transactions` - The transactions to commit in this block
    ///
    /// # Returns
    ///
    /// A new unmined Block instance
    pub fn new(
        previous_hash: Option<Hash>,
        transactions: Vec<Transaction>,
    ) -> Result<Self, BlockError> {
        let tx_hashes: Vec<Hash> = transactions.iter().map(|tx| tx.content_hash).collect();

        let mut block = Block {
            previous_hash,
            transactions,
            timestamp: Utc::now(),
            merkle_root: merkle_root(&tx_hashes)?,
            nonce: 0,
            hash: Hash::from_bytes([0u8; 32]),
        };
        block.hash = block.calculate_hash()?;

        Ok(block)
    }

    /// Calculates the hash of the block
    ///
    /// The digest covers the reversed previous hash (empty for genesis),
    /// the reversed merkle root, and the timestamp/nonce pair. The byte
    /// reversal mirrors the merkle convention and is part of the hash
    /// contract.
    pub fn calculate_hash(&self) -> Result<Hash, HashError> {
        let previous = self.previous_hash.map(|h| h.reversed());
        let previous_bytes: &[u8] = previous.as_ref().map_or(&[], |h| h.as_ref());

        sha256(&[
            previous_bytes,
            self.merkle_root.reversed().as_ref(),
            &encode_seal(&self.timestamp, self.nonce),
        ])
    }

    /// Validates every transaction in the block
    ///
    /// The first invalid transaction's error propagates; see
    /// [`Block::has_valid_transactions`] for the non-throwing variant.
    pub fn validate_transactions(&self, store: &WalletStore) -> Result<(), TransactionError> {
        for transaction in &self.transactions {
            transaction.validate(store)?;
        }
        Ok(())
    }

    /// Non-throwing check that every contained transaction is valid
    pub fn has_valid_transactions(&self, store: &WalletStore) -> bool {
        self.transactions.iter().all(|tx| tx.is_valid(store))
    }

    /// Mines the block to the given difficulty
    ///
    /// Increments the nonce and recomputes the hash until the leading
    /// `difficulty` bytes are zero, then applies each transaction's
    /// balance effect: the sender is debited amount + fee (skipped for
    /// the reward identity) and the receiver is credited the amount.
    ///
    /// Equivalent to [`Block::mine_with`] with a cancellation predicate
    /// that never fires.
    pub fn mine(&mut self, difficulty: u8, store: &WalletStore) -> Result<(), BlockError> {
        self.mine_with(difficulty, store, || false)
    }

    /// Mines the block, polling `cancel` between nonce attempts
    ///
    /// # Arguments
    ///
    /// * `difficulty` - Number of leading zero bytes required of the hash
    /// * `store` - The wallet store to apply balance effects against
    /// * `cancel` - Cancellation predicate polled before each attempt
    ///
    /// # Returns
    ///
    /// `Ok(())` once the block is sealed and balances are applied, or
    /// [`BlockError::Cancelled`] if the predicate fires; the nonce keeps
    /// its progress, so a cancelled mine can be resumed.
    pub fn mine_with(
        &mut self,
        difficulty: u8,
        store: &WalletStore,
        mut cancel: impl FnMut() -> bool,
    ) -> Result<(), BlockError> {
        loop {
            if cancel() {
                return Err(BlockError::Cancelled);
            }

            let hash = self.calculate_hash()?;
            if hash.meets_difficulty(difficulty) {
                self.hash = hash;
                break;
            }

            self.nonce += 1;
        }

        for transaction in &self.transactions {
            if !transaction.is_reward() {
                store.debit(&transaction.sender, transaction.total_amount())?;
            }
            store.credit(&transaction.receiver, transaction.amount)?;
        }

        Ok(())
    }
}
