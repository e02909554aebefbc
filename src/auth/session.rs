//! Session token handling
//!
//! Stateless session credentials for identities that completed a
//! challenge-response login.
//!
//! Security notes:
//! - Tokens are HS256 JWTs (HMAC-SHA256)
//! - The secret is 32 random bytes generated when the issuer is built and
//!   lives only in process memory; a restart invalidates every session
//! - Expiry is a hard boundary, no leeway is applied

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::crypto::generate_random_bytes;
use crate::types::{KnockError, Result};

/// Session lifetime in seconds (30 minutes)
pub const SESSION_TTL_SECONDS: i64 = 30 * 60;

/// Signing secret length in bytes
pub const SECRET_LEN: usize = 32;

/// Payload stored in a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Authenticated username
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Expiration time in Unix milliseconds; the value expiry is checked against
    pub exp_ms: i64,
}

impl SessionClaims {
    pub fn subject(&self) -> &str {
        &self.sub
    }
}

/// Mints and verifies session tokens with a process-lifetime secret
pub struct SessionIssuer {
    secret: Zeroizing<[u8; SECRET_LEN]>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SessionIssuer {
    /// Create an issuer with a freshly generated secret
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            secret: Zeroizing::new(generate_random_bytes::<SECRET_LEN>()),
            clock,
            ttl,
        }
    }

    /// Mint a token for `subject`, valid from now until now + TTL
    pub fn mint(&self, subject: &str) -> Result<String> {
        let now = self.clock.now();
        let expires_at = now + self.ttl;

        let claims = SessionClaims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            exp_ms: expires_at.timestamp_millis(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_slice()),
        )
        .map_err(|e| KnockError::Internal(format!("Failed to generate token: {}", e)))?;

        debug!("Session minted for {}", subject);
        Ok(token)
    }

    /// Verify signature, structure and expiry of a token
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        let claims = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_slice()),
            &self.validation(),
        )
        .map(|data| data.claims)
        .map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            let reason = match err.kind() {
                ErrorKind::InvalidSignature => "invalid signature",
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) => {
                    "malformed token"
                }
                _ => "token validation failed",
            };
            debug!("Session token rejected: {}", reason);
            KnockError::InvalidToken("Invalid or expired token".into())
        })?;

        if self.clock.now().timestamp_millis() >= claims.exp_ms {
            debug!("Session token for {} expired", claims.sub);
            return Err(KnockError::InvalidToken("Invalid or expired token".into()));
        }

        Ok(claims)
    }

    /// Subject of an already verified token
    pub fn subject_of(claims: &SessionClaims) -> &str {
        claims.subject()
    }

    /// Expiry is checked against the injected clock, not by jsonwebtoken
    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string(), "sub".to_string()]);
        validation
    }
}

impl std::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Extract token from an Authorization header value.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_bearer_token(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}
