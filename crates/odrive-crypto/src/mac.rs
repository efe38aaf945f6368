//! Permission MAC (`DoMAC`).
//!
//! ```text
//! mac = HMAC-SHA256(master_key, LP(iv) || LP(grantee) || LP(cruds) || LP(encrypt_key))
//! ```
//!
//! where `LP(x) = LE32(len(x)) || x` and `cruds` is five bytes, one per
//! capability in create/read/update/delete/share order, each `0x00` or `0x01`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::keys::MasterKey;
use crate::{CryptoError, Result};

type HmacSha256 = Hmac<Sha256>;

/// MAC output length in bytes.
pub const MAC_LEN: usize = 32;

/// Capability flags in create, read, update, delete, share order.
pub type CrudsFlags = [bool; 5];

/// Compute the permission MAC.
pub fn do_mac(
    master_key: &MasterKey,
    iv: &[u8],
    grantee: &str,
    cruds: CrudsFlags,
    encrypt_key: &[u8],
) -> Result<[u8; MAC_LEN]> {
    let mac = keyed(master_key, iv, grantee, cruds, encrypt_key)?;
    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Verify a stored permission MAC in constant time.
pub fn verify_mac(
    master_key: &MasterKey,
    iv: &[u8],
    grantee: &str,
    cruds: CrudsFlags,
    encrypt_key: &[u8],
    expected: &[u8],
) -> Result<()> {
    keyed(master_key, iv, grantee, cruds, encrypt_key)?
        .verify_slice(expected)
        .map_err(|_| CryptoError::MacMismatch)
}

fn keyed(
    master_key: &MasterKey,
    iv: &[u8],
    grantee: &str,
    cruds: CrudsFlags,
    encrypt_key: &[u8],
) -> Result<HmacSha256> {
    let flags: Vec<u8> = cruds.iter().map(|b| u8::from(*b)).collect();
    let message = encode_multi_field(&[iv, grantee.as_bytes(), &flags, encrypt_key]);
    let mut mac = <HmacSha256 as Mac>::new_from_slice(master_key.as_bytes())
        .map_err(|e| CryptoError::MacKey(e.to_string()))?;
    mac.update(&message);
    Ok(mac)
}

/// Encode multiple dynamic fields using length-prefixed encoding.
///
/// `LE32(len(field1)) || field1 || LE32(len(field2)) || field2 || ...`
pub fn encode_multi_field(fields: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut output = Vec::with_capacity(total_len);
    for field in fields {
        output.extend_from_slice(&(field.len() as u32).to_le_bytes());
        output.extend_from_slice(field);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: CrudsFlags = [true; 5];

    fn master() -> MasterKey {
        MasterKey::from_passphrase("master").expect("master key")
    }

    #[test]
    fn test_mac_deterministic_and_fixed_length() {
        let m = master();
        let a = do_mac(&m, &[1u8; 32], "cnalice", ALL, &[9u8; 32]).expect("mac");
        let b = do_mac(&m, &[1u8; 32], "cnalice", ALL, &[9u8; 32]).expect("mac");
        assert_eq!(a, b);
        assert_eq!(a.len(), MAC_LEN);

        let empty = do_mac(&m, &[], "", [false; 5], &[]).expect("empty mac");
        assert_eq!(empty.len(), MAC_LEN);
    }

    #[test]
    fn test_mac_binds_every_field() {
        let m = master();
        let base = do_mac(&m, &[1u8; 32], "cnalice", ALL, &[9u8; 32]).expect("mac");

        let other_iv = do_mac(&m, &[2u8; 32], "cnalice", ALL, &[9u8; 32]).expect("mac");
        let other_grantee = do_mac(&m, &[1u8; 32], "cnbob", ALL, &[9u8; 32]).expect("mac");
        let read_only = do_mac(
            &m,
            &[1u8; 32],
            "cnalice",
            [false, true, false, false, false],
            &[9u8; 32],
        )
        .expect("mac");
        let other_key = do_mac(&m, &[1u8; 32], "cnalice", ALL, &[8u8; 32]).expect("mac");
        let other_master = do_mac(
            &MasterKey::from_passphrase("other").expect("master"),
            &[1u8; 32],
            "cnalice",
            ALL,
            &[9u8; 32],
        )
        .expect("mac");

        for variant in [other_iv, other_grantee, read_only, other_key, other_master] {
            assert_ne!(base, variant);
        }
    }

    #[test]
    fn test_verify_mac() {
        let m = master();
        let mac = do_mac(&m, &[1u8; 32], "cnalice", ALL, &[9u8; 32]).expect("mac");
        verify_mac(&m, &[1u8; 32], "cnalice", ALL, &[9u8; 32], &mac).expect("verifies");

        let err = verify_mac(&m, &[1u8; 32], "cnmallory", ALL, &[9u8; 32], &mac)
            .expect_err("grantee swap must fail");
        assert!(matches!(err, CryptoError::MacMismatch));
    }

    #[test]
    fn test_length_prefix_prevents_field_shifting() {
        let m = master();
        let a = do_mac(&m, b"ab", "c", ALL, &[]).expect("mac");
        let b = do_mac(&m, b"a", "bc", ALL, &[]).expect("mac");
        assert_ne!(a, b);
    }

    #[test]
    fn test_multi_field_encoding() {
        let encoded = encode_multi_field(&[b"hello", b"world"]);
        assert_eq!(encoded.len(), 4 + 5 + 4 + 5);
        assert_eq!(&encoded[0..4], &5u32.to_le_bytes());
        assert_eq!(&encoded[4..9], b"hello");
        assert_eq!(&encoded[9..13], &5u32.to_le_bytes());
        assert_eq!(&encoded[13..18], b"world");
    }
}
