//! Client-side key custody
//!
//! Each local identity gets a P-256 keypair. The private key is encrypted
//! at rest under a password-derived key (Argon2id + AES-256-GCM); the
//! public key is kept in plaintext beside it for signup and fingerprinting.

pub mod crypto;
pub mod store;

pub use crypto::{
    decrypt_private_key, derive_key_encryption_key, encrypt_private_key, KdfParams, IV_LEN,
    SALT_LEN,
};
pub use store::{KeyVault, METADATA_FILE, METADATA_LEN, PRIVATE_KEY_FILE, PUBLIC_KEY_FILE};
