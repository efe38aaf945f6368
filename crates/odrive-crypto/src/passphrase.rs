//! `ApplyPassphrase`: the self-inverse key wrap.
//!
//! ```text
//! block_i   = HMAC-SHA256(master_key, iv || BE32(i))
//! output[j] = input[j] XOR block_{j / 32}[j % 32]
//! ```
//!
//! Applying the transform twice with the same `(master_key, iv)` returns the
//! original bytes, so the same function wraps and unwraps.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::keys::{FileKey, MasterKey};
use crate::{CryptoError, Result};

type HmacSha256 = Hmac<Sha256>;

const BLOCK_LEN: usize = 32;

/// Keyed XOR of `data` with a keystream derived from `iv` under `master_key`.
pub fn apply_passphrase(master_key: &MasterKey, iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    for (counter, chunk) in data.chunks(BLOCK_LEN).enumerate() {
        let block = keystream_block(master_key, iv, counter as u32)?;
        out.extend(chunk.iter().zip(block.iter()).map(|(d, k)| d ^ k));
    }
    Ok(out)
}

fn keystream_block(master_key: &MasterKey, iv: &[u8], counter: u32) -> Result<[u8; BLOCK_LEN]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(master_key.as_bytes())
        .map_err(|e| CryptoError::MacKey(e.to_string()))?;
    mac.update(iv);
    mac.update(&counter.to_be_bytes());
    let mut block = [0u8; BLOCK_LEN];
    block.copy_from_slice(&mac.finalize().into_bytes());
    Ok(block)
}

/// Wrap a file key for storage in a permission row.
pub fn wrap_file_key(master_key: &MasterKey, iv: &[u8], key: &FileKey) -> Result<Vec<u8>> {
    apply_passphrase(master_key, iv, key.as_bytes())
}

/// Recover the file key from a permission row's wrapped copy.
///
/// A result of the wrong length is an integrity failure.
pub fn unwrap_file_key(master_key: &MasterKey, iv: &[u8], encrypted: &[u8]) -> Result<FileKey> {
    let raw = apply_passphrase(master_key, iv, encrypted)?;
    FileKey::from_slice(&raw)
}

/// Unwrap a row written before permission IVs existed.
///
/// Legacy rows were keyed by the grantee's distinguished name instead of an IV.
pub fn legacy_unwrap_file_key(
    master_key: &MasterKey,
    distinguished_name: &str,
    encrypted: &[u8],
) -> Result<FileKey> {
    unwrap_file_key(master_key, distinguished_name.as_bytes(), encrypted)
}

/// Move a wrapped key from `old` to `new` without exposing the ciphertext.
pub fn rewrap(old: &MasterKey, new: &MasterKey, iv: &[u8], encrypted: &[u8]) -> Result<Vec<u8>> {
    let plain = apply_passphrase(old, iv, encrypted)?;
    apply_passphrase(new, iv, &plain)
}
