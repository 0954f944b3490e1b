//! Optional payload signature scheme.
//!
//! A signed payload is `seq: u32 | nonce: u64 | signature: [u8; 16]`
//! followed by the inner payload. The signature is a pair of keyed FNV-1a
//! hashes over `(key, seq, nonce, payload)` with the field order swapped
//! between the two halves. This gives tamper evidence for deployments that
//! want it; the message flow itself never requires it.

use crate::wire::{put_u32, put_u64};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const SECOND_HASH_TWEAK: u64 = 0x9e37_79b9_7f4a_7c15;

/// Bytes the security header adds in front of the inner payload.
pub const SECURITY_HEADER_SIZE: usize = 4 + 8 + 16;

/// Parsed security prefix of a wrapped payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityHeader {
    pub seq: u32,
    pub nonce: u64,
    pub signature: [u8; 16],
}

fn fnv1a_update(mut hash: u64, data: &[u8]) -> u64 {
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Computes the 16-byte signature for `(key, seq, nonce, payload)`.
pub fn compute_signature(key: &str, seq: u32, nonce: u64, payload: &[u8]) -> [u8; 16] {
    let seq_bytes = seq.to_be_bytes();
    let nonce_bytes = nonce.to_be_bytes();

    let mut hash1 = fnv1a_update(FNV_OFFSET, key.as_bytes());
    hash1 = fnv1a_update(hash1, &seq_bytes);
    hash1 = fnv1a_update(hash1, &nonce_bytes);
    hash1 = fnv1a_update(hash1, payload);

    let mut hash2 = fnv1a_update(FNV_OFFSET ^ SECOND_HASH_TWEAK, key.as_bytes());
    hash2 = fnv1a_update(hash2, &nonce_bytes);
    hash2 = fnv1a_update(hash2, &seq_bytes);
    hash2 = fnv1a_update(hash2, payload);

    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&hash1.to_be_bytes());
    out[8..].copy_from_slice(&hash2.to_be_bytes());
    out
}

/// Checks a header's signature against the inner payload.
pub fn verify_signature(key: &str, header: &SecurityHeader, payload: &[u8]) -> bool {
    compute_signature(key, header.seq, header.nonce, payload) == header.signature
}

/// Prepends a signed security header to `payload`.
pub fn wrap_secure_payload(seq: u32, nonce: u64, key: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(SECURITY_HEADER_SIZE + payload.len());
    put_u32(&mut out, seq);
    put_u64(&mut out, nonce);
    out.extend_from_slice(&compute_signature(key, seq, nonce, payload));
    out.extend_from_slice(payload);
    out
}

/// Splits a wrapped payload into its header and inner payload. Returns
/// `None` when the payload is shorter than the security header.
pub fn unwrap_secure_payload(payload: &[u8]) -> Option<(SecurityHeader, Vec<u8>)> {
    if payload.len() < SECURITY_HEADER_SIZE {
        return None;
    }
    let seq = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let mut nonce_bytes = [0u8; 8];
    nonce_bytes.copy_from_slice(&payload[4..12]);
    let nonce = u64::from_be_bytes(nonce_bytes);
    let mut signature = [0u8; 16];
    signature.copy_from_slice(&payload[12..28]);
    let header = SecurityHeader {
        seq,
        nonce,
        signature,
    };
    Some((header, payload[SECURITY_HEADER_SIZE..].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_then_unwrap_verifies() {
        let payload = b"inner payload";
        let wrapped = wrap_secure_payload(7, 0x1122334455667788, "dev-secret", payload);
        let (header, inner) = unwrap_secure_payload(&wrapped).expect("header fits");
        assert_eq!(header.seq, 7);
        assert_eq!(header.nonce, 0x1122334455667788);
        assert_eq!(inner, payload);
        assert!(verify_signature("dev-secret", &header, &inner));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let wrapped = wrap_secure_payload(1, 2, "dev-secret", b"data");
        let (header, mut inner) = unwrap_secure_payload(&wrapped).unwrap();
        inner[0] ^= 0xFF;
        assert!(!verify_signature("dev-secret", &header, &inner));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let wrapped = wrap_secure_payload(1, 2, "dev-secret", b"data");
        let (header, inner) = unwrap_secure_payload(&wrapped).unwrap();
        assert!(!verify_signature("other-secret", &header, &inner));
    }

    #[test]
    fn signature_depends_on_seq_and_nonce_order() {
        // The two halves hash seq/nonce in opposite order, so swapping the
        // values must change both halves.
        let a = compute_signature("k", 1, 2, b"p");
        let b = compute_signature("k", 2, 1, b"p");
        assert_ne!(a[..8], b[..8]);
        assert_ne!(a[8..], b[8..]);
    }

    #[test]
    fn short_payload_cannot_be_unwrapped() {
        assert!(unwrap_secure_payload(&[0u8; SECURITY_HEADER_SIZE - 1]).is_none());
        let (_, inner) = unwrap_secure_payload(&[0u8; SECURITY_HEADER_SIZE]).unwrap();
        assert!(inner.is_empty());
    }
}
