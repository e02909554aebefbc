//! Client side of the handshake
//!
//! The agent owns one local keypair (a [`KeyVault`]) and at most one
//! session token. It never retries: every call is attempt-once, and a
//! failed login leaves the caller to fetch a fresh challenge.

use tracing::{debug, info};

use crate::client::Transport;
use crate::protocol::{Request, Response};
use crate::types::{KnockError, Result};
use crate::vault::KeyVault;

/// Token retained after a successful login
struct Session {
    username: String,
    token: String,
}

/// Drives signup, login and authenticated calls with one keypair
pub struct ClientAgent<T: Transport> {
    vault: KeyVault,
    transport: T,
    session: Option<Session>,
}

impl<T: Transport> std::fmt::Debug for ClientAgent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientAgent")
            .field("logged_in_as", &self.username())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ClientAgent<T> {
    pub fn new(vault: KeyVault, transport: T) -> Self {
        Self {
            vault,
            transport,
            session: None,
        }
    }

    pub fn vault(&self) -> &KeyVault {
        &self.vault
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Username of the current session, if logged in
    pub fn username(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.username.as_str())
    }

    /// The retained session token, if logged in
    pub fn token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.token.as_str())
    }

    /// Register the vault's public key under `username`
    pub async fn signup(&self, username: &str) -> Result<()> {
        let response = self
            .send(Request::Signup {
                username: username.to_string(),
                public_key: self.vault.public_key().to_base64()?,
            })
            .await?;
        info!("{}: {}", username, message_of(&response));
        Ok(())
    }

    /// Fetch a challenge for `username`, sign it, and keep the session
    /// token on success.
    ///
    /// Any previously held token is replaced.
    pub async fn log_in(&mut self, username: &str) -> Result<()> {
        let challenge = self
            .send(Request::Challenge {
                username: username.to_string(),
            })
            .await?
            .challenge
            .ok_or_else(|| KnockError::Internal("Challenge response carried no challenge".into()))?;
        debug!("Received challenge for {}", username);

        let signed_challenge = self.vault.keypair().sign_challenge(&challenge);
        let token = self
            .send(Request::Login {
                username: username.to_string(),
                signed_challenge,
            })
            .await?
            .token
            .ok_or_else(|| KnockError::Internal("Login response carried no token".into()))?;

        self.session = Some(Session {
            username: username.to_string(),
            token,
        });
        info!("Login successful for {}", username);
        Ok(())
    }

    /// Ask the server who the current token belongs to
    pub async fn get_profile(&self) -> Result<String> {
        let token = self.bearer()?;
        self.send(Request::GetProfile { token })
            .await?
            .username
            .ok_or_else(|| KnockError::Internal("Profile response carried no username".into()))
    }

    /// Tell the server we are leaving and drop the token.
    ///
    /// The token is discarded locally even if the server rejects it.
    pub async fn logout(&mut self) -> Result<()> {
        let token = self.bearer()?;
        let outcome = self.send(Request::Logout { token }).await;
        let session = self.session.take();
        let response = outcome?;
        if let Some(session) = session {
            info!("{}: {}", session.username, message_of(&response));
        }
        Ok(())
    }

    /// The retained token as a bearer credential
    fn bearer(&self) -> Result<String> {
        self.token()
            .map(|token| format!("Bearer {token}"))
            .ok_or_else(|| KnockError::InvalidToken("Not logged in".into()))
    }

    async fn send(&self, request: Request) -> Result<Response> {
        let kind = request.kind();
        let reply = self.transport.exchange(request.to_fields()).await?;
        let response = Response::from_fields(&reply)?;
        debug!("{} -> {}", kind, response.status.as_str());
        response.into_result()
    }
}

fn message_of(response: &Response) -> &str {
    response.message.as_deref().unwrap_or("ok")
}
