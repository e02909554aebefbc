//! Configuration for keyknock
//!
//! CLI arguments and environment variable handling using clap.

use std::path::PathBuf;

use chrono::Duration;
use clap::Parser;

use crate::auth::{validate_username, AuthConfig, CHALLENGE_TTL_SECONDS, SESSION_TTL_SECONDS};

/// keyknock - public-key challenge-response login
///
/// "Knock and it shall be opened" - Matthew 7:7-8
#[derive(Parser, Debug, Clone)]
#[command(name = "keyknock")]
#[command(about = "Prove possession of a private key and receive a session token")]
pub struct Args {
    /// Directory holding one sub-directory of key files per local identity
    #[arg(long, env = "VAULT_DIR", default_value = "./keys")]
    pub vault_dir: PathBuf,

    /// SQLite database for registered identities (in-memory when omitted)
    #[arg(long, env = "DATABASE_PATH")]
    pub database: Option<PathBuf>,

    /// Seconds a login challenge stays valid
    #[arg(long, env = "CHALLENGE_TTL_SECONDS", default_value_t = CHALLENGE_TTL_SECONDS)]
    pub challenge_ttl_seconds: i64,

    /// Seconds a session token stays valid
    #[arg(long, env = "SESSION_TTL_SECONDS", default_value_t = SESSION_TTL_SECONDS)]
    pub session_ttl_seconds: i64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Local identity to sign up and log in as
    #[arg(long, env = "KNOCK_USERNAME", default_value = "alice")]
    pub username: String,

    /// Password protecting the private key at rest
    #[arg(long, env = "VAULT_PASSWORD", hide_env_values = true)]
    pub password: String,
}

impl Args {
    /// TTL pair for the server components
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            challenge_ttl: Duration::seconds(self.challenge_ttl_seconds),
            session_ttl: Duration::seconds(self.session_ttl_seconds),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.challenge_ttl_seconds <= 0 {
            return Err("CHALLENGE_TTL_SECONDS must be positive".to_string());
        }

        if self.session_ttl_seconds <= 0 {
            return Err("SESSION_TTL_SECONDS must be positive".to_string());
        }

        if self.password.is_empty() {
            return Err("VAULT_PASSWORD must not be empty".to_string());
        }

        validate_username(&self.username).map_err(|e| e.public_message())?;

        Ok(())
    }
}
