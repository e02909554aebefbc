//! Username to public key bindings
//!
//! The registry owns uniqueness; the backing [`IdentityStore`] only has to
//! provide an atomic insert-if-absent and a point lookup. Any engine that
//! satisfies that (concurrent map, SQL table with a unique username) is
//! interchangeable.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{error, info, warn};

use crate::crypto::PublicKey;
use crate::types::{KnockError, Result};

/// Maximum accepted username length
pub const MAX_USERNAME_LEN: usize = 100;

/// Persistence contract for identities
pub trait IdentityStore: Send + Sync {
    /// Insert the binding only if `username` is absent.
    ///
    /// Returns `false` when the username is already taken. Failures of the
    /// underlying engine are reported as [`KnockError::StorageUnavailable`].
    fn insert_if_absent(&self, username: &str, public_key: &[u8]) -> Result<bool>;

    /// Fetch the encoded public key bound to `username`
    fn lookup(&self, username: &str) -> Result<Option<Vec<u8>>>;
}

/// In-process identity store backed by a concurrent map
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identities: DashMap<String, Vec<u8>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn insert_if_absent(&self, username: &str, public_key: &[u8]) -> Result<bool> {
        match self.identities.entry(username.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(public_key.to_vec());
                Ok(true)
            }
        }
    }

    fn lookup(&self, username: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.identities.get(username).map(|k| k.value().clone()))
    }
}

/// Check that a username is usable as a registry key and a vault directory name
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(KnockError::BadRequest("Username is required".into()));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(KnockError::BadRequest(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if username == "." || username == ".." {
        return Err(KnockError::BadRequest("Invalid username".into()));
    }
    if username
        .chars()
        .any(|c| c.is_control() || c == '/' || c == '\\')
    {
        return Err(KnockError::BadRequest(
            "Username contains invalid characters".into(),
        ));
    }
    Ok(())
}

/// Registry of known identities
#[derive(Clone)]
pub struct UserRegistry {
    store: Arc<dyn IdentityStore>,
}

impl UserRegistry {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Registry over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryIdentityStore::new()))
    }

    /// Bind `public_key` to `username`; fails if the username is taken.
    pub fn register(&self, username: &str, public_key: &PublicKey) -> Result<()> {
        validate_username(username)?;
        let encoded = public_key.to_der()?;

        let inserted = self.store.insert_if_absent(username, &encoded).map_err(|e| {
            error!("Identity store insert failed for {}: {}", username, e);
            e
        })?;

        if !inserted {
            warn!("Signup attempt with already registered username: {}", username);
            return Err(KnockError::AlreadyExists(
                "Username already registered".into(),
            ));
        }

        info!("User {} registered", username);
        Ok(())
    }

    /// Public key bound to `username`, if any
    pub fn lookup(&self, username: &str) -> Result<Option<PublicKey>> {
        let Some(encoded) = self.store.lookup(username)? else {
            return Ok(None);
        };

        PublicKey::from_der(&encoded).map(Some).map_err(|e| {
            error!("Stored public key for {} is unreadable: {}", username, e);
            KnockError::Internal(format!("Stored public key for {username} is corrupt"))
        })
    }

    pub fn exists(&self, username: &str) -> Result<bool> {
        Ok(self.store.lookup(username)?.is_some())
    }
}

impl std::fmt::Debug for UserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRegistry").finish_non_exhaustive()
    }
}
