use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::fmt;

/// Errors that can occur during hashing
#[derive(Debug, Error)]
pub enum HashError {
    #[error("At least one input is required")]
    NoInput,
}

/// A 32-byte SHA-256 digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Creates a hash from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// Gets the underlying bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns a copy with the byte order reversed
    ///
    /// The ledger's hash contract feeds previous-block hashes and merkle
    /// nodes into SHA-256 in reversed byte order; this helper keeps that
    /// convention in one place.
    pub fn reversed(&self) -> Self {
        let mut bytes = self.0;
        bytes.reverse();
        Hash(bytes)
    }

    /// Checks whether the first `difficulty` bytes are all zero
    pub fn meets_difficulty(&self, difficulty: u8) -> bool {
        let prefix = (difficulty as usize).min(self.0.len());
        self.0[..prefix].iter().all(|b| *b == 0)
    }

    /// Converts the hash to a hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hash from a hexadecimal string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Hash(arr))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", &self.to_hex()[..8])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Hashes one or more byte sequences with SHA-256
///
/// The parts are fed to the digest in order, so the result equals the
/// hash of their concatenation. Fails if no parts are supplied; an empty
/// part is legal (hashing "nothing" is spelled `sha256(&[b""])`).
pub fn sha256(parts: &[&[u8]]) -> Result<Hash, HashError> {
    if parts.is_empty() {
        return Err(HashError::NoInput);
    }

    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }

    Ok(Hash(hasher.finalize().into()))
}
