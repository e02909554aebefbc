//! On-disk key vault
//!
//! Layout per local identity:
//!
//! ```text
//! <root>/<username>/private.key    AES-256-GCM ciphertext of the PKCS#8 key
//! <root>/<username>/public.key     SubjectPublicKeyInfo DER, plaintext
//! <root>/<username>/key_metadata   salt (16 bytes) || iv (16 bytes)
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::auth::validate_username;
use crate::crypto::{generate_random_bytes, Keypair, PublicKey};
use crate::types::{KnockError, Result};
use crate::vault::crypto::{
    decrypt_private_key, derive_key_encryption_key, encrypt_private_key, KdfParams, IV_LEN,
    SALT_LEN,
};

pub const PRIVATE_KEY_FILE: &str = "private.key";
pub const PUBLIC_KEY_FILE: &str = "public.key";
pub const METADATA_FILE: &str = "key_metadata";

/// Size of the metadata blob
pub const METADATA_LEN: usize = SALT_LEN + IV_LEN;

/// A keypair plus the directory it is persisted under
#[derive(Debug, Clone)]
pub struct KeyVault {
    root: PathBuf,
    keypair: Keypair,
    kdf: KdfParams,
}

impl KeyVault {
    /// Generate a new in-memory keypair; nothing is written until [`store`](Self::store)
    pub fn generate(root: impl Into<PathBuf>) -> Self {
        let vault = Self {
            root: root.into(),
            keypair: Keypair::generate(),
            kdf: KdfParams::default(),
        };
        info!("Generated new P-256 keypair");
        vault
    }

    /// Override the Argon2id cost. The same parameters must be used to load.
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// SHA-256 fingerprint of the public key
    pub fn fingerprint(&self) -> Result<String> {
        self.keypair.public_key().fingerprint()
    }

    /// Whether all three records exist for `username` under `root`
    pub fn exists(root: &Path, username: &str) -> bool {
        let dir = root.join(username);
        [PRIVATE_KEY_FILE, PUBLIC_KEY_FILE, METADATA_FILE]
            .iter()
            .all(|f| dir.join(f).is_file())
    }

    /// Encrypt and persist the keypair for `username`.
    ///
    /// A fresh salt and IV are generated on every call.
    pub fn store(&self, username: &str, password: &str) -> Result<()> {
        validate_username(username)?;
        let dir = self.root.join(username);

        fs::create_dir_all(&dir).map_err(|e| {
            KnockError::IoFailure(format!("Cannot create vault directory {:?}: {}", dir, e))
        })?;

        let salt: [u8; SALT_LEN] = generate_random_bytes();
        let iv: [u8; IV_LEN] = generate_random_bytes();

        let encryption_key = derive_key_encryption_key(password.as_bytes(), &salt, self.kdf)?;
        let private_der = self.keypair.to_pkcs8_der()?;
        let ciphertext = encrypt_private_key(&private_der, &encryption_key, &iv)?;

        let mut metadata = Vec::with_capacity(METADATA_LEN);
        metadata.extend_from_slice(&salt);
        metadata.extend_from_slice(&iv);
        let public_der = self.keypair.public_key().to_der()?;

        replace_records(
            &dir,
            &[
                (PRIVATE_KEY_FILE, ciphertext.as_slice()),
                (PUBLIC_KEY_FILE, public_der.as_slice()),
                (METADATA_FILE, metadata.as_slice()),
            ],
        )?;

        info!("Keys saved in {:?}", dir);
        Ok(())
    }

    /// Load and decrypt the keypair stored for `username` with default KDF cost
    pub fn load(root: impl Into<PathBuf>, username: &str, password: &str) -> Result<Self> {
        Self::load_with_kdf(root, username, password, KdfParams::default())
    }

    /// Load and decrypt the keypair stored for `username`.
    ///
    /// A wrong password and a damaged vault both yield
    /// [`KnockError::DecryptionFailed`].
    pub fn load_with_kdf(
        root: impl Into<PathBuf>,
        username: &str,
        password: &str,
        kdf: KdfParams,
    ) -> Result<Self> {
        validate_username(username)?;
        let root = root.into();
        let dir = root.join(username);

        let ciphertext = read_record(&dir.join(PRIVATE_KEY_FILE))?;
        let public_der = read_record(&dir.join(PUBLIC_KEY_FILE))?;
        let metadata = read_record(&dir.join(METADATA_FILE))?;

        let unlock_failed = || KnockError::DecryptionFailed("Unable to unlock key vault".into());

        if metadata.len() != METADATA_LEN {
            warn!("Vault metadata for {} has unexpected length", username);
            return Err(unlock_failed());
        }
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        salt.copy_from_slice(&metadata[..SALT_LEN]);
        iv.copy_from_slice(&metadata[SALT_LEN..]);

        let encryption_key = derive_key_encryption_key(password.as_bytes(), &salt, kdf)?;
        let private_der = decrypt_private_key(&ciphertext, &encryption_key, &iv)?;
        let keypair = Keypair::from_pkcs8_der(&private_der).map_err(|_| unlock_failed())?;

        let stored_public = PublicKey::from_der(&public_der).map_err(|_| unlock_failed())?;
        if stored_public != keypair.public_key() {
            warn!("Vault public key for {} does not match private key", username);
            return Err(unlock_failed());
        }

        info!("Loaded keypair for {} from {:?}", username, dir);
        Ok(Self { root, keypair, kdf })
    }
}

fn staged_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.tmp"))
}

fn retired_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.bak"))
}

/// Replace all records in `dir` or none of them.
///
/// Every record is written to a `.tmp` file first. Only when all writes
/// succeed are the live files moved aside and the new ones renamed into
/// place; a failed rename puts the previous files back.
fn replace_records(dir: &Path, records: &[(&str, &[u8])]) -> Result<()> {
    let names: Vec<&str> = records.iter().map(|(name, _)| *name).collect();

    for (written, (name, bytes)) in records.iter().enumerate() {
        if let Err(e) = write_record(&staged_path(dir, name), bytes) {
            discard_staged(dir, &names[..written]);
            return Err(e);
        }
    }

    let mut retired = Vec::new();
    for name in &names {
        let live = dir.join(name);
        if fs::symlink_metadata(&live).is_err() {
            continue;
        }
        if let Err(e) = fs::rename(&live, retired_path(dir, name)) {
            restore_retired(dir, &retired);
            discard_staged(dir, &names);
            return Err(KnockError::IoFailure(format!("Cannot move {:?} aside: {}", live, e)));
        }
        retired.push(*name);
    }

    for (committed, name) in names.iter().enumerate() {
        let live = dir.join(name);
        if let Err(e) = fs::rename(staged_path(dir, name), &live) {
            for name in &names[..committed] {
                let _ = remove_path(&dir.join(name));
            }
            restore_retired(dir, &retired);
            discard_staged(dir, &names);
            return Err(KnockError::IoFailure(format!("Cannot replace {:?}: {}", live, e)));
        }
    }

    for name in retired {
        let path = retired_path(dir, name);
        if let Err(e) = remove_path(&path) {
            warn!("Cannot remove previous vault record {:?}: {}", path, e);
        }
    }
    Ok(())
}

fn discard_staged(dir: &Path, names: &[&str]) {
    for name in names {
        let _ = remove_path(&staged_path(dir, name));
    }
}

fn restore_retired(dir: &Path, names: &[&str]) {
    for name in names {
        if let Err(e) = fs::rename(retired_path(dir, name), dir.join(name)) {
            warn!("Cannot restore vault record {} in {:?}: {}", name, dir, e);
        }
    }
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn write_record(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)
        .map_err(|e| KnockError::IoFailure(format!("Cannot write {:?}: {}", path, e)))
}

fn read_record(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Vault record missing: {:?}", path);
            Err(KnockError::NotFound(
                "Key files not found. Have you generated keys yet?".into(),
            ))
        }
        Err(e) => Err(KnockError::IoFailure(format!("Cannot read {:?}: {}", path, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KDF: KdfParams = KdfParams {
        memory_kb: 1024,
        iterations: 1,
        parallelism: 1,
    };

    fn vault(root: &Path) -> KeyVault {
        KeyVault::generate(root).with_kdf(TEST_KDF)
    }

    #[test]
    fn test_store_writes_three_records() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(dir.path());
        vault.store("alice", "hunter2").unwrap();

        let user_dir = dir.path().join("alice");
        assert_eq!(fs::read(user_dir.join(METADATA_FILE)).unwrap().len(), 32);
        assert_eq!(
            fs::read(user_dir.join(PUBLIC_KEY_FILE)).unwrap(),
            vault.public_key().to_der().unwrap()
        );
        assert!(KeyVault::exists(dir.path(), "alice"));
        assert!(!KeyVault::exists(dir.path(), "bob"));
    }

    #[test]
    fn test_store_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let original = vault(dir.path());
        original.store("alice", "hunter2").unwrap();

        let loaded = KeyVault::load_with_kdf(dir.path(), "alice", "hunter2", TEST_KDF).unwrap();
        assert_eq!(loaded.public_key(), original.public_key());
        assert_eq!(loaded.fingerprint().unwrap(), original.fingerprint().unwrap());

        // Loaded key signs in a way the original public key accepts
        let signature = loaded.keypair().sign_challenge("nonce");
        assert!(original
            .public_key()
            .verify_challenge("nonce", &signature)
            .is_ok());
    }

    #[test]
    fn test_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        vault(dir.path()).store("alice", "hunter2").unwrap();

        let result = KeyVault::load_with_kdf(dir.path(), "alice", "hunter3", TEST_KDF);
        assert!(matches!(result, Err(KnockError::DecryptionFailed(_))));
    }

    #[test]
    fn test_corruption_indistinguishable_from_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        vault(dir.path()).store("alice", "hunter2").unwrap();

        let wrong = KeyVault::load_with_kdf(dir.path(), "alice", "nope", TEST_KDF).unwrap_err();

        let key_path = dir.path().join("alice").join(PRIVATE_KEY_FILE);
        let mut bytes = fs::read(&key_path).unwrap();
        bytes[3] ^= 0xff;
        fs::write(&key_path, bytes).unwrap();
        let corrupt = KeyVault::load_with_kdf(dir.path(), "alice", "hunter2", TEST_KDF).unwrap_err();

        assert_eq!(wrong.to_string(), corrupt.to_string());
    }

    #[test]
    fn test_truncated_metadata() {
        let dir = tempfile::tempdir().unwrap();
        vault(dir.path()).store("alice", "hunter2").unwrap();
        fs::write(dir.path().join("alice").join(METADATA_FILE), [0u8; 20]).unwrap();

        assert!(matches!(
            KeyVault::load_with_kdf(dir.path(), "alice", "hunter2", TEST_KDF),
            Err(KnockError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_swapped_public_key_detected() {
        let dir = tempfile::tempdir().unwrap();
        vault(dir.path()).store("alice", "hunter2").unwrap();
        let other = Keypair::generate().public_key().to_der().unwrap();
        fs::write(dir.path().join("alice").join(PUBLIC_KEY_FILE), other).unwrap();

        assert!(matches!(
            KeyVault::load_with_kdf(dir.path(), "alice", "hunter2", TEST_KDF),
            Err(KnockError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            KeyVault::load_with_kdf(dir.path(), "ghost", "pw", TEST_KDF),
            Err(KnockError::NotFound(_))
        ));
    }

    #[test]
    fn test_unwritable_namespace_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the vault root directory should be
        let blocker = dir.path().join("root");
        fs::write(&blocker, b"").unwrap();

        let result = vault(&blocker).store("alice", "pw");
        assert!(matches!(result, Err(KnockError::IoFailure(_))));
    }

    #[test]
    fn test_restore_uses_fresh_salt_and_iv() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(dir.path());
        let meta_path = dir.path().join("alice").join(METADATA_FILE);

        vault.store("alice", "pw").unwrap();
        let first = fs::read(&meta_path).unwrap();
        vault.store("alice", "pw").unwrap();
        let second = fs::read(&meta_path).unwrap();

        assert_ne!(first, second);
        assert!(KeyVault::load_with_kdf(dir.path(), "alice", "pw", TEST_KDF).is_ok());
    }

    #[test]
    fn test_failed_restore_keeps_previous_vault() {
        let dir = tempfile::tempdir().unwrap();
        let first = vault(dir.path());
        first.store("alice", "pw").unwrap();

        // The second staged write cannot be created
        let user_dir = dir.path().join("alice");
        fs::create_dir(user_dir.join("public.key.tmp")).unwrap();

        let second = vault(dir.path());
        assert!(matches!(
            second.store("alice", "pw"),
            Err(KnockError::IoFailure(_))
        ));
        assert!(!user_dir.join("private.key.tmp").exists());

        let loaded = KeyVault::load_with_kdf(dir.path(), "alice", "pw", TEST_KDF).unwrap();
        assert_eq!(loaded.public_key(), first.public_key());
    }

    #[test]
    fn test_restore_replaces_damaged_record() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(dir.path());
        vault.store("alice", "pw").unwrap();

        let public_path = dir.path().join("alice").join(PUBLIC_KEY_FILE);
        fs::remove_file(&public_path).unwrap();
        fs::create_dir(&public_path).unwrap();

        vault.store("alice", "pw").unwrap();
        let loaded = KeyVault::load_with_kdf(dir.path(), "alice", "pw", TEST_KDF).unwrap();
        assert_eq!(loaded.public_key(), vault.public_key());
        assert!(!dir.path().join("alice").join("public.key.bak").exists());
    }

    #[test]
    fn test_path_traversal_username_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            vault(dir.path()).store("../escape", "pw"),
            Err(KnockError::BadRequest(_))
        ));
    }
}
