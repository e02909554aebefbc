//! Cryptographic primitives for the key vault.
//!
//! # Algorithms
//!
//! - **Key Derivation**: Argon2id (memory-hard, brute-force resistant)
//! - **Encryption**: AES-256-GCM with a 128-bit IV (authenticated encryption)
//!
//! # Security Parameters
//!
//! Argon2id parameters are tuned for password-based key encryption:
//! - 64 MB memory (prevents GPU attacks)
//! - 3 iterations
//! - 4 parallelism threads

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use crate::types::{KnockError, Result};

// =============================================================================
// Constants
// =============================================================================

/// Argon2id memory cost in KiB (64 MB)
pub const ARGON2_MEMORY_KB: u32 = 65536;

/// Argon2id iteration count
pub const ARGON2_ITERATIONS: u32 = 3;

/// Argon2id parallelism (threads)
pub const ARGON2_PARALLELISM: u32 = 4;

/// Salt length for key derivation (16 bytes)
pub const SALT_LEN: usize = 16;

/// IV length for AES-GCM (16 bytes)
pub const IV_LEN: usize = 16;

/// Derived key length (256 bits)
pub const KEY_LEN: usize = 32;

/// AES-GCM auth tag length (16 bytes)
pub const AUTH_TAG_LEN: usize = 16;

/// AES-256-GCM with a 16-byte IV
type VaultCipher = AesGcm<Aes256, U16>;

// =============================================================================
// Key Derivation
// =============================================================================

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kb: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kb: ARGON2_MEMORY_KB,
            iterations: ARGON2_ITERATIONS,
            parallelism: ARGON2_PARALLELISM,
        }
    }
}

/// Derive a 256-bit encryption key from a password using Argon2id.
///
/// # Arguments
///
/// - `password`: User's password (UTF-8 bytes)
/// - `salt`: Random 16-byte salt stored beside the encrypted key
/// - `params`: Argon2id cost; must match the parameters used at store time
pub fn derive_key_encryption_key(
    password: &[u8],
    salt: &[u8; SALT_LEN],
    params: KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let params = Params::new(
        params.memory_kb,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| KnockError::Internal(format!("Invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password, salt, &mut key[..])
        .map_err(|e| KnockError::Internal(format!("Key derivation failed: {e}")))?;

    Ok(key)
}

// =============================================================================
// Encryption / Decryption
// =============================================================================

/// Encrypt an encoded private key.
///
/// Returns ciphertext with the 16-byte auth tag appended.
pub fn encrypt_private_key(
    private_key: &[u8],
    encryption_key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
) -> Result<Vec<u8>> {
    let cipher = VaultCipher::new(Key::<VaultCipher>::from_slice(encryption_key));
    cipher
        .encrypt(Nonce::<U16>::from_slice(iv), private_key)
        .map_err(|e| KnockError::Internal(format!("Encryption failed: {e}")))
}

/// Decrypt an encoded private key.
///
/// A wrong key and a tampered ciphertext fail identically.
pub fn decrypt_private_key(
    ciphertext: &[u8],
    encryption_key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = VaultCipher::new(Key::<VaultCipher>::from_slice(encryption_key));
    cipher
        .decrypt(Nonce::<U16>::from_slice(iv), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| KnockError::DecryptionFailed("Unable to unlock key vault".into()))
}

// =============================================================================
// Tests
// =============================================================================
