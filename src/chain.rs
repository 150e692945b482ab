use ed25519_dalek::SigningKey;
use log::{debug, info, warn};
use thiserror::Error;

use std::collections::HashSet;

use super::block::{Block, BlockError};
use super::hash::HashError;
use super::transaction::{Transaction, TransactionError};
use super::wallet::{CryptoError, WalletStore};

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Block error: {0}")]
    BlockError(#[from] BlockError),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),

    #[error("Hash error: {0}")]
    HashError(#[from] HashError),
}

/// Tunable parameters for a ledger
#[derive(Debug, Clone, Copy)]
pub struct ChainConfig {
    /// Number of leading zero bytes required of a block hash
    pub difficulty: u8,

    /// Amount paid to the miner of each block
    pub mining_reward: f64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            difficulty: 1,
            mining_reward: 50.0,
        }
    }
}

/// The ledger: a hash-linked chain of blocks plus the pending pool
///
/// Owns the chain, the pending transactions, and the wallet store. All
/// mutation goes through `&mut self`, so a ledger has a single writer by
/// construction; embedders that share one across threads put it behind
/// their own lock. Multiple independent ledgers can coexist (each is a
/// plain value, there is no global state).
#[derive(Debug)]
pub struct Blockchain {
    /// The chain of blocks, genesis first
    chain: Vec<Block>,

    /// Pending transactions to be included in the next block
    pending_transactions: Vec<Transaction>,

    /// Candidate block currently being mined, if any
    candidate: Option<Block>,

    /// Mining difficulty (number of leading zero bytes required)
    difficulty: u8,

    /// Mining reward
    mining_reward: f64,

    /// The authoritative wallet registry
    wallets: WalletStore,
}

impl Blockchain {
    /// Creates a new ledger with a genesis block and default parameters
    pub fn new() -> Result<Self, BlockchainError> {
        Self::with_config(ChainConfig::default())
    }

    /// Creates a new ledger with the given parameters
    pub fn with_config(config: ChainConfig) -> Result<Self, BlockchainError> {
        let genesis = Block::new(None, Vec::new())?;

        Ok(Blockchain {
            chain: vec![genesis],
            pending_transactions: Vec::new(),
            candidate: None,
            difficulty: config.difficulty,
            mining_reward: config.mining_reward,
            wallets: WalletStore::new(),
        })
    }

    /// Gets the wallet store
    pub fn wallets(&self) -> &WalletStore {
        &self.wallets
    }

    /// Creates and registers a wallet, returning its signing key
    pub fn create_wallet(&self, handle: &str) -> Result<SigningKey, BlockchainError> {
        Ok(self.wallets.create(handle)?)
    }

    /// Gets the chain of blocks, genesis first
    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    /// Gets the block at the chain tip
    pub fn tip(&self) -> &Block {
        // The chain is created with a genesis block and is append-only
        self.chain.last().expect("chain holds at least the genesis block")
    }

    /// Gets the pending transactions
    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    /// Gets the current mining difficulty
    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    /// Gets the current mining reward
    pub fn mining_reward(&self) -> f64 {
        self.mining_reward
    }

    /// Checks whether a candidate block is currently being mined
    pub fn is_mining(&self) -> bool {
        self.candidate.is_some()
    }

    /// Halves the mining reward
    pub fn halve_reward(&mut self) {
        self.mining_reward /= 2.0;
        info!("Mining reward halved to {}", self.mining_reward);
    }

    /// Creates, signs, validates, and queues a transaction
    ///
    /// # Arguments
    ///
    /// * `sender` - Handle of the paying wallet
    /// * `receiver` - Handle of the receiving wallet
    /// * `amount` - The amount to transfer
    /// * `fee` - The transaction fee
    /// * `signing_key` - The sender's signing key
    ///
    /// # Returns
    ///
    /// `Ok(())` once the transaction is queued. Validation failures
    /// propagate to the caller as a rejection; the pending pool is only
    /// touched when the transaction is valid.
    pub fn submit_transaction(
        &mut self,
        sender: &str,
        receiver: &str,
        amount: f64,
        fee: f64,
        signing_key: &SigningKey,
    ) -> Result<(), BlockchainError> {
        let transaction =
            Transaction::new(&self.wallets, sender, receiver, amount, fee, signing_key)?;
        transaction.validate(&self.wallets)?;

        debug!(
            "Queued transaction {}: {} -> {} ({} + {} fee)",
            transaction.id, sender, receiver, amount, fee
        );
        self.pending_transactions.push(transaction);

        Ok(())
    }

    fn new_candidate(&self) -> Result<Block, BlockchainError> {
        Ok(Block::new(
            Some(self.tip().hash),
            self.pending_transactions.clone(),
        )?)
    }

    /// Starts a candidate block over the pending pool, if none is active
    pub fn begin_block(&mut self) -> Result<(), BlockchainError> {
        if self.candidate.is_none() {
            self.candidate = Some(self.new_candidate()?);
        }
        Ok(())
    }

    /// Mines the candidate block and appends it to the chain
    ///
    /// Equivalent to [`Blockchain::mine_and_commit_with`] with a
    /// cancellation predicate that never fires.
    pub fn mine_and_commit(&mut self, miner: &str) -> Result<Block, BlockchainError> {
        self.mine_and_commit_with(miner, || false)
    }

    /// Mines the candidate block, polling `cancel` between nonce attempts
    ///
    /// Starts a candidate over the pending pool if none is active, mines
    /// it to the current difficulty (applying each transaction's balance
    /// effect), and appends it. The pending pool then opens with a reward
    /// transaction paying the miner, followed by any transactions queued
    /// too late for the mined block. Every 10 appended blocks the
    /// difficulty increases by one.
    ///
    /// # Arguments
    ///
    /// * `miner` - Handle of the wallet receiving the mining reward
    /// * `cancel` - Cancellation predicate polled between nonce attempts
    ///
    /// # Returns
    ///
    /// The committed block. On cancellation the candidate is kept, nonce
    /// progress included, so a later call resumes where this one stopped.
    pub fn mine_and_commit_with(
        &mut self,
        miner: &str,
        cancel: impl FnMut() -> bool,
    ) -> Result<Block, BlockchainError> {
        // Fail before burning CPU if the miner is unknown
        self.wallets.get(miner)?;

        let mut block = match self.candidate.take() {
            Some(block) => block,
            None => self.new_candidate()?,
        };

        if let Err(err) = block.mine_with(self.difficulty, &self.wallets, cancel) {
            self.candidate = Some(block);
            return Err(err.into());
        }

        info!(
            "Committed block {} with {} transactions (nonce {}, difficulty {})",
            self.chain.len(),
            block.transactions.len(),
            block.nonce,
            self.difficulty
        );

        // Transactions queued after the candidate was started are not in
        // the mined block; they stay pending for the next one. The next
        // block opens with the miner's reward.
        let mined: HashSet<&str> = block
            .transactions
            .iter()
            .map(|tx| tx.id.as_str())
            .collect();
        self.pending_transactions
            .retain(|tx| !mined.contains(tx.id.as_str()));
        self.pending_transactions
            .insert(0, Transaction::reward(&self.wallets, miner, self.mining_reward)?);

        self.chain.push(block.clone());

        if self.chain.len() % 10 == 0 {
            self.difficulty += 1;
            info!("Difficulty increased to {}", self.difficulty);
        }

        Ok(block)
    }

    /// Recomputes a wallet's balance from the chain and compares it to
    /// the live balance
    ///
    /// Replays every committed transaction from genesis, debiting the
    /// sender (the reward identity excepted) and crediting the receiver.
    ///
    /// # Arguments
    ///
    /// * `handle` - Handle of the wallet to verify
    ///
    /// # Returns
    ///
    /// `true` if the replayed balance matches the live one; a mismatch
    /// means a balance was mutated outside of mining
    pub fn verify_balance(&self, handle: &str) -> Result<bool, BlockchainError> {
        let wallet = self.wallets.get(handle)?;

        let mut balance = 0.0;
        for block in &self.chain {
            for transaction in &block.transactions {
                if transaction.sender == handle && !transaction.is_reward() {
                    balance -= transaction.total_amount();
                }
                if transaction.receiver == handle {
                    balance += transaction.amount;
                }
            }
        }

        Ok(balance == wallet.balance)
    }

    /// Verifies the integrity of the whole chain
    ///
    /// # Returns
    ///
    /// `true` iff every block's stored hash matches its freshly
    /// recomputed hash, the genesis block has no predecessor, and every
    /// other block links to the hash of the block before it
    pub fn verify_chain(&self) -> bool {
        for (i, block) in self.chain.iter().enumerate() {
            match block.calculate_hash() {
                Ok(hash) if hash == block.hash => {}
                _ => {
                    warn!("Block {} stored hash does not match its contents", i);
                    return false;
                }
            }

            let expected_previous = if i == 0 {
                None
            } else {
                Some(self.chain[i - 1].hash)
            };
            if block.previous_hash != expected_previous {
                warn!("Block {} does not link to its predecessor", i);
                return false;
            }
        }

        true
    }
}
