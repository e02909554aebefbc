//! Request dispatcher
//!
//! Every request is independent: the only cross-request state is the
//! registry, the outstanding challenges, and the bearer token the client
//! carries. All failures are converted to `status=fail` responses here.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::auth::{
    extract_bearer_token, AuthConfig, ChallengeStore, SessionIssuer, UserRegistry,
};
use crate::clock::{Clock, SystemClock};
use crate::crypto::PublicKey;
use crate::protocol::{Fields, Request, Response};
use crate::types::{KnockError, Result};

/// The protocol state machine
#[derive(Debug, Clone)]
pub struct ProtocolHandler {
    registry: UserRegistry,
    challenges: Arc<ChallengeStore>,
    sessions: Arc<SessionIssuer>,
}

impl ProtocolHandler {
    pub fn new(
        registry: UserRegistry,
        challenges: Arc<ChallengeStore>,
        sessions: Arc<SessionIssuer>,
    ) -> Self {
        Self {
            registry,
            challenges,
            sessions,
        }
    }

    /// Wire up challenge store and session issuer over `registry`
    pub fn with_registry(registry: UserRegistry, config: AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let challenges = Arc::new(ChallengeStore::new(
            registry.clone(),
            clock.clone(),
            config.challenge_ttl,
        ));
        let sessions = Arc::new(SessionIssuer::new(clock, config.session_ttl));
        Self::new(registry, challenges, sessions)
    }

    /// Handler over an in-memory registry and the system clock
    pub fn in_memory() -> Self {
        Self::with_registry(
            UserRegistry::in_memory(),
            AuthConfig::default(),
            Arc::new(SystemClock),
        )
    }

    pub fn registry(&self) -> &UserRegistry {
        &self.registry
    }

    pub fn challenges(&self) -> &ChallengeStore {
        &self.challenges
    }

    pub fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }

    /// Handle a raw field map, validating it into a [`Request`] first
    pub fn handle_fields(&self, fields: &Fields) -> Fields {
        let response = match Request::from_fields(fields) {
            Ok(request) => self.handle(request),
            Err(e) => {
                warn!("Rejected malformed request: {}", e);
                Response::fail(e.public_message())
            }
        };
        response.to_fields()
    }

    /// Handle one request. Never fails; errors become `fail` responses.
    pub fn handle(&self, request: Request) -> Response {
        let kind = request.kind();

        let result = match request {
            Request::Signup {
                username,
                public_key,
            } => self.signup(&username, &public_key),
            Request::Challenge { username } => self.challenge(&username),
            Request::Login {
                username,
                signed_challenge,
            } => self.login(&username, &signed_challenge),
            Request::Logout { token } => self.logout(&token),
            Request::GetProfile { token } => self.get_profile(&token),
        };

        result.unwrap_or_else(|e| {
            match &e {
                KnockError::StorageUnavailable(_) | KnockError::Internal(_) => {
                    error!("{} request failed: {}", kind, e)
                }
                _ => warn!("{} request rejected: {}", kind, e),
            }
            Response::fail(e.public_message())
        })
    }

    fn signup(&self, username: &str, public_key: &str) -> Result<Response> {
        let public_key = PublicKey::from_base64(public_key)?;
        self.registry.register(username, &public_key)?;
        Ok(Response::ok("Signup successful"))
    }

    fn challenge(&self, username: &str) -> Result<Response> {
        let nonce = self.challenges.issue(username)?;
        info!("Challenge generated for {}", username);
        Ok(Response::ok("Challenge issued").with_challenge(nonce))
    }

    /// The challenge is consumed before the signature is checked, so a
    /// wrong or malformed answer still burns it.
    fn login(&self, username: &str, signed_challenge: &str) -> Result<Response> {
        let nonce = self.challenges.redeem(username)?;

        let public_key = self
            .registry
            .lookup(username)?
            .ok_or_else(|| KnockError::NotFound("Public key not found".into()))?;

        public_key.verify_challenge(&nonce, signed_challenge)?;

        let token = self.sessions.mint(username)?;
        info!("Login successful for {}", username);
        Ok(Response::ok("Login successful").with_token(token))
    }

    fn logout(&self, token: &str) -> Result<Response> {
        let claims = self.sessions.verify(bearer(token)?)?;
        info!(
            "User {} logged out (client-side only)",
            SessionIssuer::subject_of(&claims)
        );
        Ok(Response::ok("Logged out successfully"))
    }

    fn get_profile(&self, token: &str) -> Result<Response> {
        let claims = bearer(token)
            .and_then(|token| self.sessions.verify(token))
            .map_err(|_| KnockError::InvalidToken("Unauthorized".into()))?;
        let username = SessionIssuer::subject_of(&claims);
        info!("Profile access granted to {}", username);
        Ok(Response::ok("Profile retrieved").with_username(username))
    }
}

/// Accepts either a raw token or a `Bearer <token>` credential
fn bearer(token: &str) -> Result<&str> {
    extract_bearer_token(Some(token))
        .ok_or_else(|| KnockError::InvalidToken("Invalid or expired token".into()))
}
