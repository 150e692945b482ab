use dashmap::DashMap;
use ed25519_dalek::{Signature, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::sync::Arc;

use super::hash::{sha256, Hash, HashError};

/// Handle of the privileged reward identity
///
/// The wallet registered under the empty handle originates mining-reward
/// transactions and is exempt from signature and balance checks.
pub const REWARD_HANDLE: &str = "";

/// Errors that can occur during wallet and key operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Handle must only contain alphanumeric characters: {0:?}")]
    InvalidHandle(String),

    #[error("A wallet with handle {0:?} already exists")]
    DuplicateHandle(String),

    #[error("No wallet registered for handle {0:?}")]
    UnknownWallet(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),

    #[error("Hash error: {0}")]
    HashError(#[from] HashError),
}

/// Represents a digital signature (base58-encoded ed25519)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    /// Creates a digital signature from a raw signature
    pub fn from_signature(signature: &Signature) -> Self {
        DigitalSignature(bs58::encode(signature.to_bytes()).into_string())
    }

    /// Converts the digital signature back to a raw signature
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let signature_bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature("Invalid signature length".to_string()))?;

        Ok(Signature::from_bytes(&signature_bytes))
    }
}

/// A public identity in the ledger
///
/// A wallet carries a human-readable handle, a verifying key, and the
/// balance observed by every transaction that names the handle. Balances
/// are mutated only when a block containing such a transaction is mined.
#[derive(Debug, Clone)]
pub struct Wallet {
    /// Human-readable handle; empty for the reward identity
    pub handle: String,

    /// The wallet's public key
    pub public_key: VerifyingKey,

    /// Current balance
    pub balance: f64,
}

impl Wallet {
    fn new(handle: String, public_key: VerifyingKey) -> Self {
        Wallet {
            handle,
            public_key,
            balance: 0.0,
        }
    }

    /// Checks whether this is the privileged reward identity
    pub fn is_reward(&self) -> bool {
        self.handle == REWARD_HANDLE
    }

    /// Computes the wallet's content hash
    ///
    /// The digest covers the UTF-8 handle and the canonical byte encoding
    /// of the public key.
    pub fn content_hash(&self) -> Result<Hash, HashError> {
        sha256(&[self.handle.as_bytes(), self.public_key.as_bytes()])
    }

    /// Checks whether the wallet can cover the given total
    pub fn has_sufficient_funds(&self, total: f64) -> bool {
        self.balance >= total
    }
}

/// Verifies a signature over a message against a public key
pub fn verify_signature(
    message: &[u8],
    signature: &DigitalSignature,
    public_key: &VerifyingKey,
) -> Result<bool, CryptoError> {
    let signature = signature.to_signature()?;

    Ok(public_key.verify(message, &signature).is_ok())
}

/// The authoritative registry of all wallets in a ledger
///
/// Wallets are shared by handle: transactions store handles, never wallet
/// copies, so a balance update is observed consistently by everything
/// that names the wallet. The reward identity is registered at
/// construction under [`REWARD_HANDLE`] with its secret discarded.
#[derive(Debug, Clone)]
pub struct WalletStore {
    wallets: Arc<DashMap<String, Wallet>>,
}

impl WalletStore {
    /// Creates a new wallet store holding only the reward identity
    pub fn new() -> Self {
        let store = WalletStore {
            wallets: Arc::new(DashMap::new()),
        };

        // The reward identity never signs, so its secret is dropped here
        let signing_key = SigningKey::generate(&mut OsRng);
        store.wallets.insert(
            REWARD_HANDLE.to_string(),
            Wallet::new(REWARD_HANDLE.to_string(), signing_key.verifying_key()),
        );

        store
    }

    /// Creates and registers a wallet for the given handle
    ///
    /// # Arguments
    ///
    /// * `handle` - A non-empty alphanumeric handle, unique in this store
    ///
    /// # Returns
    ///
    /// The generated signing key; it is handed to the caller and never
    /// retained, key storage being the caller's concern. Fails if the
    /// handle is empty or not alphanumeric, or if it is already taken.
    pub fn create(&self, handle: &str) -> Result<SigningKey, CryptoError> {
        if handle.is_empty() || !handle.chars().all(char::is_alphanumeric) {
            return Err(CryptoError::InvalidHandle(handle.to_string()));
        }

        if self.wallets.contains_key(handle) {
            return Err(CryptoError::DuplicateHandle(handle.to_string()));
        }

        let signing_key = SigningKey::generate(&mut OsRng);
        self.wallets.insert(
            handle.to_string(),
            Wallet::new(handle.to_string(), signing_key.verifying_key()),
        );

        Ok(signing_key)
    }

    /// Gets a snapshot of the wallet for the given handle
    pub fn get(&self, handle: &str) -> Result<Wallet, CryptoError> {
        self.wallets
            .get(handle)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CryptoError::UnknownWallet(handle.to_string()))
    }

    /// Gets the current balance for the given handle
    pub fn balance(&self, handle: &str) -> Result<f64, CryptoError> {
        Ok(self.get(handle)?.balance)
    }

    /// Credits the wallet's balance
    ///
    /// Only the mining procedure applies balance effects, so this stays
    /// crate-private.
    pub(crate) fn credit(&self, handle: &str, amount: f64) -> Result<(), CryptoError> {
        let mut entry = self
            .wallets
            .get_mut(handle)
            .ok_or_else(|| CryptoError::UnknownWallet(handle.to_string()))?;
        entry.balance += amount;
        Ok(())
    }

    /// Debits the wallet's balance
    pub(crate) fn debit(&self, handle: &str, amount: f64) -> Result<(), CryptoError> {
        let mut entry = self
            .wallets
            .get_mut(handle)
            .ok_or_else(|| CryptoError::UnknownWallet(handle.to_string()))?;
        entry.balance -= amount;
        Ok(())
    }
}

impl Default for WalletStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::Signer;

    #[test]
    fn test_create_wallet() {
        let store = WalletStore::new();
        let key = store.create("alice").unwrap();

        let wallet = store.get("alice").unwrap();
        assert_eq!(wallet.handle, "alice");
        assert_eq!(wallet.balance, 0.0);
        assert_eq!(wallet.public_key, key.verifying_key());
        assert!(!wallet.is_reward());
    }

    #[test]
    fn test_handle_must_be_alphanumeric() {
        let store = WalletStore::new();

        assert!(matches!(
            store.create("not valid"),
            Err(CryptoError::InvalidHandle(_))
        ));
        assert!(matches!(
            store.create(""),
            Err(CryptoError::InvalidHandle(_))
        ));
        assert!(store.create("alice42").is_ok());
    }

    #[test]
    fn test_duplicate_handle_rejected() {
        let store = WalletStore::new();
        store.create("alice").unwrap();

        assert!(matches!(
            store.create("alice"),
            Err(CryptoError::DuplicateHandle(_))
        ));
    }

    #[test]
    fn test_reward_wallet_registered_at_construction() {
        let store = WalletStore::new();
        let reward = store.get(REWARD_HANDLE).unwrap();

        assert!(reward.is_reward());
        assert_eq!(reward.balance, 0.0);
    }

    #[test]
    fn test_content_hash_depends_on_handle_and_key() {
        let store = WalletStore::new();
        store.create("alice").unwrap();
        store.create("bob").unwrap();

        let alice = store.get("alice").unwrap();
        let bob = store.get("bob").unwrap();

        assert_eq!(
            alice.content_hash().unwrap(),
            alice.content_hash().unwrap()
        );
        assert_ne!(alice.content_hash().unwrap(), bob.content_hash().unwrap());
    }

    #[test]
    fn test_signing_and_verification() {
        let store = WalletStore::new();
        let key = store.create("alice").unwrap();
        let wallet = store.get("alice").unwrap();

        let message = b"payment intent";
        let signature = DigitalSignature::from_signature(&key.sign(message));

        assert!(verify_signature(message, &signature, &wallet.public_key).unwrap());
        assert!(!verify_signature(b"tampered", &signature, &wallet.public_key).unwrap());
    }

    #[test]
    fn test_credit_and_debit() {
        let store = WalletStore::new();
        store.create("alice").unwrap();

        store.credit("alice", 100.0).unwrap();
        assert_eq!(store.balance("alice").unwrap(), 100.0);

        store.debit("alice", 40.0).unwrap();
        assert_eq!(store.balance("alice").unwrap(), 60.0);
    }

    #[test]
    fn test_unknown_wallet() {
        let store = WalletStore::new();
        assert!(matches!(
            store.get("nobody"),
            Err(CryptoError::UnknownWallet(_))
        ));
    }
}
