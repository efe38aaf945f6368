//! File keys, the master key, and permission IVs.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, Result};

/// File key length in bytes.
pub const FILE_KEY_LEN: usize = 32;

/// Permission IV length in bytes.
pub const PERMISSION_IV_LEN: usize = 32;

/// The symmetric key a single object's ciphertext is encrypted under.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct FileKey([u8; FILE_KEY_LEN]);

impl FileKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; FILE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a file key from an unwrapped slice, rejecting wrong lengths.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; FILE_KEY_LEN] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: FILE_KEY_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; FILE_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FileKey(..)")
    }
}

/// Process-wide secret used to wrap per-grantee copies of file keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey(Vec<u8>);

impl MasterKey {
    /// Create a master key from raw bytes. Empty keys are rejected.
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(CryptoError::EmptyMasterKey);
        }
        Ok(Self(bytes))
    }

    /// Create a master key from the configured passphrase string.
    pub fn from_passphrase(passphrase: &str) -> Result<Self> {
        Self::new(passphrase.as_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Generate a fresh random file key.
pub fn create_key() -> FileKey {
    let mut bytes = [0u8; FILE_KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    FileKey(bytes)
}

/// Generate a fresh per-permission IV. Never reuse one across permissions.
pub fn create_permission_iv() -> [u8; PERMISSION_IV_LEN] {
    let mut iv = [0u8; PERMISSION_IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}
