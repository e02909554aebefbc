//! keyknock - challenge-response login demo
//!
//! "Knock and it shall be opened" - Matthew 7:7-8

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use keyknock::{
    auth::UserRegistry,
    client::{ClientAgent, LoopbackTransport},
    clock::SystemClock,
    config::Args,
    db::SqliteIdentityStore,
    logging,
    protocol::{ProtocolHandler, Request},
    vault::KeyVault,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    logging::init_tracing(&args.log_level, args.log_json)?;

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  keyknock");
    info!("  \"Knock and it shall be opened\"");
    info!("======================================");
    info!("Vault: {:?}", args.vault_dir);
    info!(
        "Registry: {}",
        args.database
            .as_ref()
            .map(|p| format!("{:?}", p))
            .unwrap_or_else(|| "in-memory".into())
    );
    info!(
        "Challenge TTL: {}s, session TTL: {}s",
        args.challenge_ttl_seconds, args.session_ttl_seconds
    );
    info!("======================================");

    // Server side
    let registry = match &args.database {
        Some(path) => UserRegistry::new(Arc::new(SqliteIdentityStore::open(path)?)),
        None => UserRegistry::in_memory(),
    };
    let handler = ProtocolHandler::with_registry(registry, args.auth_config(), Arc::new(SystemClock));

    // Client side
    let vault = if KeyVault::exists(&args.vault_dir, &args.username) {
        KeyVault::load(&args.vault_dir, &args.username, &args.password)?
    } else {
        let vault = KeyVault::generate(&args.vault_dir);
        vault.store(&args.username, &args.password)?;
        vault
    };
    info!("Key fingerprint: {}", vault.fingerprint()?);

    let mut agent = ClientAgent::new(vault, LoopbackTransport::new(handler.clone()));

    if handler.registry().exists(&args.username)? {
        info!("{} already registered", args.username);
    } else {
        agent.signup(&args.username).await?;
    }

    agent.log_in(&args.username).await?;
    info!("Profile: {}", agent.get_profile().await?);

    // A captured login answer must not work twice
    let challenge = handler.handle(Request::Challenge {
        username: args.username.clone(),
    });
    match challenge.challenge {
        Some(nonce) => {
            let login = Request::Login {
                username: args.username.clone(),
                signed_challenge: agent.vault().keypair().sign_challenge(&nonce),
            };
            let first = handler.handle(login.clone());
            let replay = handler.handle(login);
            if !first.is_ok() {
                warn!("Fresh login failed: {}", first.message.as_deref().unwrap_or("fail"));
            } else if replay.is_ok() {
                error!("Replayed login was accepted");
            } else {
                info!(
                    "Replay rejected: {}",
                    replay.message.as_deref().unwrap_or("fail")
                );
            }
        }
        None => warn!("No challenge issued for replay check"),
    }

    agent.logout().await?;
    info!("Done");
    Ok(())
}
