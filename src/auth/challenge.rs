//! Single-use login challenges
//!
//! At most one live challenge per username. Issuing replaces any previous
//! entry; a login attempt removes it whether or not the answer is correct.
//! Expiry is checked lazily on access, there is no sweeper task.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::auth::UserRegistry;
use crate::clock::Clock;
use crate::crypto::generate_random_bytes;
use crate::types::{KnockError, Result};

/// Challenge lifetime in seconds
pub const CHALLENGE_TTL_SECONDS: i64 = 60;

/// Random bytes per nonce (256 bits)
pub const NONCE_LEN: usize = 32;

/// An outstanding challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Base64 text of the nonce; clients sign these exact bytes
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
}

/// Issues, validates and retires challenges
pub struct ChallengeStore {
    challenges: DashMap<String, Challenge>,
    registry: UserRegistry,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ChallengeStore {
    pub fn new(registry: UserRegistry, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            challenges: DashMap::new(),
            registry,
            clock,
            ttl,
        }
    }

    /// Issue a fresh challenge for a known user, replacing any outstanding one.
    pub fn issue(&self, username: &str) -> Result<String> {
        if !self.registry.exists(username)? {
            return Err(KnockError::NotFound("Unknown username".into()));
        }

        let nonce = BASE64.encode(generate_random_bytes::<NONCE_LEN>());
        let challenge = Challenge {
            nonce: nonce.clone(),
            issued_at: self.clock.now(),
        };

        if self
            .challenges
            .insert(username.to_string(), challenge)
            .is_some()
        {
            debug!("Replaced outstanding challenge for {}", username);
        }
        debug!("Challenge issued for {}", username);

        Ok(nonce)
    }

    /// True iff a challenge exists for `username` and is within its TTL.
    ///
    /// An expired entry is removed as a side effect.
    pub fn validate(&self, username: &str) -> bool {
        let now = self.clock.now();

        if self
            .challenges
            .remove_if(username, |_, c| self.is_expired(c, now))
            .is_some()
        {
            debug!("Expired challenge purged for {}", username);
            return false;
        }

        self.challenges.contains_key(username)
    }

    /// Stored nonce, without side effects
    pub fn peek(&self, username: &str) -> Option<String> {
        self.challenges.get(username).map(|c| c.nonce.clone())
    }

    /// Remove the challenge for `username` unconditionally.
    ///
    /// Returns the removed entry; of several concurrent callers at most one
    /// receives it.
    pub fn consume(&self, username: &str) -> Option<Challenge> {
        let removed = self.challenges.remove(username).map(|(_, c)| c);
        if removed.is_some() {
            debug!("Challenge consumed for {}", username);
        }
        removed
    }

    /// Consume the challenge and return its nonce if it was still live.
    ///
    /// This is the login path: the entry is gone after the call regardless
    /// of the outcome, so each issued challenge gets exactly one answer.
    pub fn redeem(&self, username: &str) -> Result<String> {
        let invalid = || KnockError::InvalidChallenge("Invalid or expired challenge".into());

        if !self.validate(username) {
            return Err(invalid());
        }

        let challenge = self.consume(username).ok_or_else(invalid)?;
        if self.is_expired(&challenge, self.clock.now()) {
            return Err(invalid());
        }

        Ok(challenge.nonce)
    }

    /// Number of stored (possibly expired) challenges
    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }

    /// A challenge aged exactly the TTL is still valid
    fn is_expired(&self, challenge: &Challenge, now: DateTime<Utc>) -> bool {
        now - challenge.issued_at > self.ttl
    }
}

impl std::fmt::Debug for ChallengeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeStore")
            .field("outstanding", &self.challenges.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
