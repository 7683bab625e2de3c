//! Secure random and hashing primitives
//!
//! Every token, identifier and nonce in the crate is drawn from the OS-seeded
//! thread RNG through these helpers.

use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// `len` cryptographically secure random bytes
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Hex encoding of `len` random bytes (`2 * len` characters)
pub fn random_hex(len: usize) -> String {
    hex::encode(random_bytes(len))
}

/// URL-safe base64 encoding of `len` random bytes, without padding
pub fn random_token(len: usize) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes(len))
}

/// Short, non-reversible fingerprint of a secret for logs and audit details
pub fn fingerprint(secret: &str) -> String {
    let hash = Sha256::digest(secret.as_bytes());
    hex::encode(&hash[..8])
}

/// Compare two secrets without leaking the mismatch position through timing
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
