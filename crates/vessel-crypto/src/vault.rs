//! Envelope encryption for stored credentials.
//!
//! One symmetric key per daemon, derived from configured key material via
//! HKDF-SHA256. Each encryption draws a fresh random nonce, so encrypting
//! the same plaintext twice never yields the same envelope, and envelopes
//! carry everything needed for decryption.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// HKDF info string for vault key derivation.
const HKDF_INFO: &[u8] = b"vessel-vault-key-v1";

/// HKDF salt for domain separation (recommended by RFC 5869).
const HKDF_SALT: &[u8] = b"vessel-vault-hkdf-salt-v1";

/// Nonce size for ChaCha20-Poly1305.
pub const NONCE_SIZE: usize = 12;

/// Configuration for constructing a [`Vault`].
///
/// `key_material` is an operator-provided secret (any non-empty string);
/// the actual cipher key is derived from it, never used raw.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub key_material: String,
}

/// The credential vault: a ChaCha20-Poly1305 cipher keyed once per process.
pub struct Vault {
    cipher: ChaCha20Poly1305,
}

/// Derive the 32-byte cipher key from operator key material.
///
/// The caller is responsible for zeroizing the returned bytes.
fn derive_key(key_material: &[u8]) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), key_material);
    let mut key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
    Ok(key)
}

impl Vault {
    /// Create a vault from configured key material.
    pub fn new(config: &VaultConfig) -> Result<Self, CryptoError> {
        if config.key_material.is_empty() {
            return Err(CryptoError::KeyDerivationFailed(
                "key material is empty".into(),
            ));
        }
        let mut key_bytes = derive_key(config.key_material.as_bytes())?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key_bytes));
        key_bytes.zeroize();
        Ok(Self { cipher })
    }

    /// Encrypt a plaintext credential into an envelope string.
    ///
    /// Returns `None` for empty input; an absent credential stays absent.
    /// The envelope is `hex(nonce) + ":" + hex(ciphertext)`; the random
    /// per-call nonce means equal plaintexts produce distinct envelopes.
    pub fn encrypt(&self, plaintext: &str) -> Result<Option<String>, CryptoError> {
        if plaintext.is_empty() {
            return Ok(None);
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(Some(format!(
            "{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(ciphertext)
        )))
    }

    /// Decrypt an envelope produced by [`Vault::encrypt`].
    ///
    /// Returns `None` for `None`/empty input, symmetric with `encrypt`.
    /// A malformed envelope (missing delimiter, bad hex, wrong nonce width)
    /// is `InvalidEnvelope`; an authentication failure (wrong key, tampered
    /// ciphertext) is `DecryptionFailed`.
    pub fn decrypt(&self, envelope: Option<&str>) -> Result<Option<String>, CryptoError> {
        let Some(envelope) = envelope.filter(|e| !e.is_empty()) else {
            return Ok(None);
        };

        let (nonce_hex, cipher_hex) = envelope
            .split_once(':')
            .ok_or_else(|| CryptoError::InvalidEnvelope("missing ':' delimiter".into()))?;

        let nonce_bytes = hex::decode(nonce_hex)
            .map_err(|e| CryptoError::InvalidEnvelope(format!("bad nonce hex: {e}")))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidEnvelope(format!(
                "nonce must be {NONCE_SIZE} bytes, got {}",
                nonce_bytes.len()
            )));
        }
        let ciphertext = hex::decode(cipher_hex)
            .map_err(|e| CryptoError::InvalidEnvelope(format!("bad ciphertext hex: {e}")))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|e| CryptoError::DecryptionFailed(format!("not valid UTF-8: {e}")))
    }
}
