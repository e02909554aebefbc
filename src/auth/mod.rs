//! Server-side trust primitives
//!
//! Provides:
//! - Identity registry (username to public key, unique usernames)
//! - Single-use login challenges with a TTL
//! - Stateless signed session tokens

pub mod challenge;
pub mod registry;
pub mod session;

use chrono::Duration;

pub use challenge::{Challenge, ChallengeStore, CHALLENGE_TTL_SECONDS, NONCE_LEN};
pub use registry::{
    validate_username, IdentityStore, MemoryIdentityStore, UserRegistry, MAX_USERNAME_LEN,
};
pub use session::{extract_bearer_token, SessionClaims, SessionIssuer, SESSION_TTL_SECONDS};

/// Lifetimes applied by the server components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthConfig {
    pub challenge_ttl: Duration,
    pub session_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            challenge_ttl: Duration::seconds(CHALLENGE_TTL_SECONDS),
            session_ttl: Duration::seconds(SESSION_TTL_SECONDS),
        }
    }
}
