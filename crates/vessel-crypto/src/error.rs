//! Crypto error types.

/// Errors from vault operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),
}
