use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::hash::{sha256, Hash, HashError};
use super::wallet::{
    verify_signature, CryptoError, DigitalSignature, Wallet, WalletStore, REWARD_HANDLE,
};

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Transaction must include a sender, receiver and amount")]
    MissingField,

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Transaction not signed")]
    NotSigned,

    #[error("Signature does not match the sender's public key")]
    BadSignature,

    #[error("Signing key does not match the sender's public key")]
    KeyMismatch,

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),

    #[error("Hash error: {0}")]
    HashError(#[from] HashError),
}

/// An intent to move value between two wallets
///
/// Transactions reference wallets by handle; the balance a transaction
/// observes is always the one in the ledger's wallet store. A transaction
/// is immutable once created and its balance effect is applied exactly
/// once, when the block containing it is mined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier for the transaction
    pub id: String,

    /// Handle of the sending wallet
    pub sender: String,

    /// Handle of the receiving wallet
    pub receiver: String,

    /// Amount being transferred
    pub amount: f64,

    /// Transaction fee
    pub fee: f64,

    /// Digest of the transaction's content, the message that is signed
    pub content_hash: Hash,

    /// Signature over the content hash; absent for reward transactions
    pub signature: Option<DigitalSignature>,
}

/// Encodes an amount/fee pair into the fixed-width form used for hashing
///
/// Two little-endian 32-bit floats, amount first. The layout is part of
/// the hash contract and must stay bit-exact.
fn encode_amounts(amount: f64, fee: f64) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&(amount as f32).to_le_bytes());
    out[4..].copy_from_slice(&(fee as f32).to_le_bytes());
    out
}

fn compute_content_hash(
    sender: &Wallet,
    receiver: &Wallet,
    amount: f64,
    fee: f64,
) -> Result<Hash, HashError> {
    sha256(&[
        sender.content_hash()?.as_ref(),
        receiver.content_hash()?.as_ref(),
        &encode_amounts(amount, fee),
    ])
}

impl Transaction {
    /// Creates and signs a new transaction
    ///
    /// The content hash covers the sender and receiver wallet hashes and
    /// the amount/fee pair; the signing key signs that digest. A
    /// transaction sent by the reward identity is created unsigned (the
    /// key is ignored).
    ///
    /// # Arguments
    ///
    /// * `store` - The wallet store holding both parties
    /// * `sender` - Handle of the sending wallet
    /// * `receiver` - Handle of the receiving wallet
    /// * `amount` - The amount to transfer
    /// * `fee` - The transaction fee
    /// * `signing_key` - The sender's signing key
    ///
    /// # Returns
    ///
    /// The signed transaction, or [`TransactionError::KeyMismatch`] if
    /// the key does not belong to the sender
    pub fn new(
        store: &WalletStore,
        sender: &str,
        receiver: &str,
        amount: f64,
        fee: f64,
        signing_key: &SigningKey,
    ) -> Result<Self, TransactionError> {
        let sender_wallet = store.get(sender)?;
        let receiver_wallet = store.get(receiver)?;

        let content_hash = compute_content_hash(&sender_wallet, &receiver_wallet, amount, fee)?;

        let signature = if sender_wallet.is_reward() {
            None
        } else {
            if signing_key.verifying_key() != sender_wallet.public_key {
                return Err(TransactionError::KeyMismatch);
            }
            Some(DigitalSignature::from_signature(
                &signing_key.sign(content_hash.as_ref()),
            ))
        };

        Ok(Transaction {
            id: Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
            fee,
            content_hash,
            signature,
        })
    }

    /// Creates an unsigned mining-reward transaction
    ///
    /// # Arguments
    ///
    /// * `store` - The wallet store holding the receiver
    /// * `receiver` - Handle of the miner being paid
    /// * `amount` - The reward amount
    ///
    /// # Returns
    ///
    /// A new reward transaction with no fee and no signature
    pub fn reward(
        store: &WalletStore,
        receiver: &str,
        amount: f64,
    ) -> Result<Self, TransactionError> {
        let reward_wallet = store.get(REWARD_HANDLE)?;
        let receiver_wallet = store.get(receiver)?;

        let content_hash = compute_content_hash(&reward_wallet, &receiver_wallet, amount, 0.0)?;

        Ok(Transaction {
            id: Uuid::new_v4().to_string(),
            sender: REWARD_HANDLE.to_string(),
            receiver: receiver.to_string(),
            amount,
            fee: 0.0,
            content_hash,
            signature: None,
        })
    }

    /// Checks whether this is a mining-reward transaction
    pub fn is_reward(&self) -> bool {
        self.sender == REWARD_HANDLE
    }

    /// Gets the total the sender must cover (amount + fee)
    pub fn total_amount(&self) -> f64 {
        self.amount + self.fee
    }

    /// Validates the transaction against the current wallet state
    ///
    /// Reward transactions are unconditionally valid. For every other
    /// transaction, in order:
    /// - both wallets must exist and the amount must be non-zero,
    /// - the sender's balance must cover amount + fee,
    /// - the signature must verify against the sender's public key over
    ///   the recomputed content hash.
    ///
    /// # Returns
    ///
    /// `Ok(())` for a valid transaction; each failure is reported as its
    /// own error. Callers that only want a yes/no answer use
    /// [`Transaction::is_valid`].
    pub fn validate(&self, store: &WalletStore) -> Result<(), TransactionError> {
        if self.is_reward() {
            return Ok(());
        }

        let sender = store.get(&self.sender)?;
        let receiver = store.get(&self.receiver)?;

        if self.amount == 0.0 {
            return Err(TransactionError::MissingField);
        }

        if !sender.has_sufficient_funds(self.total_amount()) {
            return Err(TransactionError::InsufficientFunds {
                required: self.total_amount(),
                available: sender.balance,
            });
        }

        let signature = self.signature.as_ref().ok_or(TransactionError::NotSigned)?;
        let content_hash = compute_content_hash(&sender, &receiver, self.amount, self.fee)?;

        if !verify_signature(content_hash.as_ref(), signature, &sender.public_key)? {
            return Err(TransactionError::BadSignature);
        }

        Ok(())
    }

    /// Non-throwing validity check
    pub fn is_valid(&self, store: &WalletStore) -> bool {
        self.validate(store).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded_store() -> (WalletStore, SigningKey, SigningKey) {
        let store = WalletStore::new();
        let alice_key = store.create("alice").unwrap();
        let bob_key = store.create("bob").unwrap();
        store.credit("alice", 100.0).unwrap();
        (store, alice_key, bob_key)
    }

    #[test]
    fn test_new_transaction_is_signed_and_valid() {
        let (store, alice_key, _) = funded_store();

        let tx = Transaction::new(&store, "alice", "bob", 10.0, 0.5, &alice_key).unwrap();

        assert!(tx.signature.is_some());
        assert!(!tx.is_reward());
        assert_eq!(tx.total_amount(), 10.5);
        tx.validate(&store).unwrap();
    }

    #[test]
    fn test_wrong_key_is_rejected_at_construction() {
        let (store, _, bob_key) = funded_store();

        let result = Transaction::new(&store, "alice", "bob", 10.0, 0.0, &bob_key);
        assert!(matches!(result, Err(TransactionError::KeyMismatch)));
    }

    #[test]
    fn test_insufficient_funds() {
        let (store, alice_key, _) = funded_store();

        let tx = Transaction::new(&store, "alice", "bob", 95.0, 10.0, &alice_key).unwrap();

        match tx.validate(&store) {
            Err(TransactionError::InsufficientFunds {
                required,
                available,
            }) => {
                assert_eq!(required, 105.0);
                assert_eq!(available, 100.0);
            }
            other => panic!("expected insufficient funds, got {:?}", other),
        }
        assert!(!tx.is_valid(&store));
    }

    #[test]
    fn test_zero_amount_is_missing_field() {
        let (store, alice_key, _) = funded_store();

        let tx = Transaction::new(&store, "alice", "bob", 0.0, 0.0, &alice_key).unwrap();
        assert!(matches!(
            tx.validate(&store),
            Err(TransactionError::MissingField)
        ));
    }

    #[test]
    fn test_tampered_amount_fails_signature_check() {
        let (store, alice_key, _) = funded_store();

        let mut tx = Transaction::new(&store, "alice", "bob", 10.0, 0.0, &alice_key).unwrap();
        tx.amount = 90.0;

        assert!(matches!(
            tx.validate(&store),
            Err(TransactionError::BadSignature)
        ));
    }

    #[test]
    fn test_reward_transaction_always_valid() {
        let (store, _, _) = funded_store();

        let tx = Transaction::reward(&store, "bob", 50.0).unwrap();

        assert!(tx.is_reward());
        assert!(tx.signature.is_none());
        // Valid even though the reward wallet's balance is zero
        tx.validate(&store).unwrap();
    }

    #[test]
    fn test_content_hash_is_order_of_fields() {
        let (store, alice_key, bob_key) = funded_store();
        store.credit("bob", 100.0).unwrap();

        let forward = Transaction::new(&store, "alice", "bob", 10.0, 0.0, &alice_key).unwrap();
        let reverse = Transaction::new(&store, "bob", "alice", 10.0, 0.0, &bob_key).unwrap();

        assert_ne!(forward.content_hash, reverse.content_hash);
    }
}
