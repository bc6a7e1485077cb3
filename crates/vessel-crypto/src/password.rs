//! Password generation, hashing, and secret comparison.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Default generated password length.
pub const DEFAULT_PASSWORD_LEN: usize = 16;

/// URL-safe alphabet. Exactly 64 characters, so sampling a byte modulo the
/// alphabet length introduces no bias.
const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Generate `length` characters of URL-safe random text from the OS CSPRNG.
pub fn generate_password(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .into_iter()
        .map(|b| ALPHABET[(b % 64) as usize] as char)
        .collect()
}

/// One-way fixed-length digest of a credential (lowercase hex SHA-256).
///
/// Supporting primitive for future credential verification; the provisioning
/// and access flows store reversible envelopes instead.
pub fn hash_password(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Constant-time string equality for shared-secret checks.
///
/// Inputs of different lengths return `false` without a full comparison;
/// the length of a configured secret is not considered sensitive.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}
