//! Non-secret digests: change tokens, snippet hashes, log fingerprints.

use sha2::{Digest, Sha256};

use crate::mac::encode_multi_field;

/// Opaque optimistic-concurrency token for a row version.
///
/// `hex(BLAKE3(LP(id) || LP(LE64(change_count)) || LP(LE64(modified_date))))`
pub fn change_token(id: &[u8], change_count: i64, modified_date: i64) -> String {
    let count = change_count.to_le_bytes();
    let modified = modified_date.to_le_bytes();
    let input = encode_multi_field(&[id, &count, &modified]);
    ::blake3::hash(&input).to_hex().to_string()
}

/// SHA-256 of a user's canonical snippet string, used by the authorization cache.
pub fn snippet_digest(snippets: &str) -> String {
    hex::encode(Sha256::digest(snippets.as_bytes()))
}

/// Short BLAKE3 fingerprint for logging values that must not be printed.
pub fn fingerprint(bytes: &[u8]) -> String {
    let hash = ::blake3::hash(bytes);
    hex::encode(&hash.as_bytes()[..8])
}
