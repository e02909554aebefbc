//! keyknock - public-key challenge-response authentication
//!
//! "Knock and it shall be opened" - Matthew 7:7-8
//!
//! A client proves possession of a P-256 private key without ever sending
//! it, and receives a short-lived signed session token in return.
//!
//! ## Components
//!
//! - **Registry**: username to public key, first signup wins
//! - **Challenges**: one outstanding single-use nonce per user, 60s TTL
//! - **Sessions**: stateless HS256 tokens, 30 minute lifetime
//! - **Protocol**: the signup / challenge / login / logout / getprofile dispatcher
//! - **Vault**: password-encrypted private key custody on the client
//! - **Client**: handshake driver over a pluggable transport

pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod db;
pub mod logging;
pub mod protocol;
pub mod types;
pub mod vault;

pub use auth::{AuthConfig, ChallengeStore, SessionIssuer, UserRegistry};
pub use client::{ClientAgent, LoopbackTransport, Transport};
pub use config::Args;
pub use crypto::{Keypair, PublicKey};
pub use protocol::{ProtocolHandler, Request, Response};
pub use types::{KnockError, Result};
pub use vault::KeyVault;
