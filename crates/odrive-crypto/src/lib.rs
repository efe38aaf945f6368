//! # odrive-crypto
//!
//! Content-key handling for Object Drive.
//!
//! Every object's ciphertext is encrypted under one random file key. That key
//! is never stored in the clear: each permission row holds its own wrapped
//! copy, produced by a keyed XOR under the process master key and a
//! per-permission IV, plus a MAC binding the copy to the grantee and the
//! granted capabilities.
//!
//! ## Modules
//!
//! - [`keys`] — File keys, the master key, permission IVs
//! - [`passphrase`] — `ApplyPassphrase` (self-inverse wrap), legacy unwrap, rotation rewrap
//! - [`mac`] — Permission MAC over (IV, grantee, CRUDS, wrapped key)
//! - [`digest`] — Change tokens, snippet digests, log fingerprints
//!
//! The database registers SQL functions that call straight into
//! [`passphrase::apply_passphrase`] and [`mac::do_mac`], so key rotation can run
//! as SQL and produce the same bytes as the application.

pub mod digest;
pub mod keys;
pub mod mac;
pub mod passphrase;

/// Error types for keying operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// A key had the wrong length after unwrapping or decoding.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// The master key is empty.
    #[error("master key is empty")]
    EmptyMasterKey,

    /// Permission MAC did not verify.
    #[error("permission MAC mismatch")]
    MacMismatch,

    /// The HMAC primitive rejected its key.
    #[error("MAC key rejected: {0}")]
    MacKey(String),

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
