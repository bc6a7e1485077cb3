//! Vessel Credential Vault
//!
//! Cryptographic primitives for container credentials: passwords are
//! generated from a CSPRNG, encrypted at rest as envelope strings, and only
//! decrypted transiently for an explicit access request.
//!
//! ## Primitives
//!
//! - **Key**: one symmetric key per daemon, derived from configured key
//!   material via HKDF-SHA256
//! - **Encryption**: ChaCha20-Poly1305 AEAD, fresh random 12-byte nonce per
//!   call, stored as `hex(nonce) + ":" + hex(ciphertext)`
//! - **Passwords**: URL-safe random text from `OsRng`

pub mod error;
pub mod password;
pub mod vault;

pub use error::CryptoError;
pub use password::{
    DEFAULT_PASSWORD_LEN, constant_time_str_eq, generate_password, hash_password,
};
pub use vault::{NONCE_SIZE, Vault, VaultConfig};
