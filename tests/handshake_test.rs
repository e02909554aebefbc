//! End-to-end handshake tests against the protocol handler

use std::sync::Arc;

use chrono::Duration;
use keyknock::{
    auth::{AuthConfig, UserRegistry},
    client::{ClientAgent, LoopbackTransport},
    clock::ManualClock,
    crypto::Keypair,
    db::SqliteIdentityStore,
    protocol::{ProtocolHandler, Request, Response},
    vault::{KdfParams, KeyVault},
    KnockError,
};

const TEST_KDF: KdfParams = KdfParams {
    memory_kb: 1024,
    iterations: 1,
    parallelism: 1,
};

fn handler_with_clock() -> (ProtocolHandler, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let handler = ProtocolHandler::with_registry(
        UserRegistry::in_memory(),
        AuthConfig::default(),
        clock.clone(),
    );
    (handler, clock)
}

fn signup(handler: &ProtocolHandler, username: &str, keypair: &Keypair) -> Response {
    handler.handle(Request::Signup {
        username: username.into(),
        public_key: keypair.public_key().to_base64().unwrap(),
    })
}

fn challenge(handler: &ProtocolHandler, username: &str) -> String {
    handler
        .handle(Request::Challenge {
            username: username.into(),
        })
        .challenge
        .expect("challenge issued")
}

fn login(handler: &ProtocolHandler, username: &str, signature: &str) -> Response {
    handler.handle(Request::Login {
        username: username.into(),
        signed_challenge: signature.into(),
    })
}

#[test]
fn test_alice_scenario() {
    let (handler, _) = handler_with_clock();
    let alice = Keypair::generate();

    assert!(signup(&handler, "alice", &alice).is_ok());

    let nonce = challenge(&handler, "alice");
    let signature = alice.sign_challenge(&nonce);
    let response = login(&handler, "alice", &signature);
    assert!(response.is_ok());
    let token = response.token.expect("token on login");

    let profile = handler.handle(Request::GetProfile { token });
    assert!(profile.is_ok());
    assert_eq!(profile.username.as_deref(), Some("alice"));

    // Same answer again: the challenge is gone
    let replay = login(&handler, "alice", &signature);
    assert!(!replay.is_ok());
    assert_eq!(replay.message.as_deref(), Some("Invalid or expired challenge"));
}

#[test]
fn test_reissued_challenge_invalidates_previous() {
    let (handler, _) = handler_with_clock();
    let alice = Keypair::generate();
    signup(&handler, "alice", &alice);

    let first = challenge(&handler, "alice");
    let second = challenge(&handler, "alice");
    assert_ne!(first, second);

    let stale = login(&handler, "alice", &alice.sign_challenge(&first));
    assert_eq!(stale.message.as_deref(), Some("Invalid signature"));

    // The stale attempt consumed the outstanding challenge too
    let late = login(&handler, "alice", &alice.sign_challenge(&second));
    assert_eq!(late.message.as_deref(), Some("Invalid or expired challenge"));
}

#[test]
fn test_challenge_ttl_boundary() {
    let (handler, clock) = handler_with_clock();
    let alice = Keypair::generate();
    signup(&handler, "alice", &alice);

    let nonce = challenge(&handler, "alice");
    clock.advance(Duration::seconds(60));
    assert!(login(&handler, "alice", &alice.sign_challenge(&nonce)).is_ok());

    let nonce = challenge(&handler, "alice");
    clock.advance(Duration::milliseconds(60_001));
    let response = login(&handler, "alice", &alice.sign_challenge(&nonce));
    assert_eq!(response.message.as_deref(), Some("Invalid or expired challenge"));
}

#[test]
fn test_session_ttl_boundary() {
    let (handler, clock) = handler_with_clock();
    let alice = Keypair::generate();
    signup(&handler, "alice", &alice);
    let nonce = challenge(&handler, "alice");
    let token = login(&handler, "alice", &alice.sign_challenge(&nonce))
        .token
        .unwrap();

    clock.advance(Duration::seconds(1799));
    assert!(handler
        .handle(Request::GetProfile {
            token: token.clone()
        })
        .is_ok());

    clock.advance(Duration::seconds(1));
    let profile = handler.handle(Request::GetProfile { token });
    assert_eq!(profile.message.as_deref(), Some("Unauthorized"));
}

#[test]
fn test_concurrent_logins_single_winner() {
    let (handler, _) = handler_with_clock();
    let alice = Keypair::generate();
    signup(&handler, "alice", &alice);

    let nonce = challenge(&handler, "alice");
    let signature = alice.sign_challenge(&nonce);

    let winners = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| login(&handler, "alice", &signature).is_ok()))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join())
            .filter(|r| matches!(r, Ok(true)))
            .count()
    });

    assert_eq!(winners, 1);
}

#[test]
fn test_concurrent_signups_single_winner() {
    let (handler, _) = handler_with_clock();
    let keys: Vec<Keypair> = (0..8).map(|_| Keypair::generate()).collect();
    let handler = &handler;

    let winners = std::thread::scope(|s| {
        let handles: Vec<_> = keys
            .iter()
            .map(|k| s.spawn(move || signup(handler, "alice", k).is_ok()))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join())
            .filter(|r| matches!(r, Ok(true)))
            .count()
    });

    assert_eq!(winners, 1);
}

#[test]
fn test_sqlite_registry_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("users.db");
    let alice = Keypair::generate();

    let token = {
        let registry = UserRegistry::new(Arc::new(SqliteIdentityStore::open(&db_path).unwrap()));
        let handler = ProtocolHandler::with_registry(
            registry,
            AuthConfig::default(),
            Arc::new(ManualClock::default()),
        );
        assert!(signup(&handler, "alice", &alice).is_ok());
        let nonce = challenge(&handler, "alice");
        login(&handler, "alice", &alice.sign_challenge(&nonce))
            .token
            .unwrap()
    };

    let registry = UserRegistry::new(Arc::new(SqliteIdentityStore::open(&db_path).unwrap()));
    let handler = ProtocolHandler::with_registry(
        registry,
        AuthConfig::default(),
        Arc::new(ManualClock::default()),
    );

    // Registration persisted
    assert!(!signup(&handler, "alice", &Keypair::generate()).is_ok());
    let nonce = challenge(&handler, "alice");
    assert!(login(&handler, "alice", &alice.sign_challenge(&nonce)).is_ok());

    // Sessions did not: the new process has a new signing secret
    let profile = handler.handle(Request::GetProfile { token });
    assert_eq!(profile.message.as_deref(), Some("Unauthorized"));
}

#[tokio::test]
async fn test_agent_with_reloaded_vault() {
    let dir = tempfile::tempdir().unwrap();
    let handler = ProtocolHandler::in_memory();

    let vault = KeyVault::generate(dir.path()).with_kdf(TEST_KDF);
    vault.store("alice", "correct horse").unwrap();
    let agent = ClientAgent::new(vault, LoopbackTransport::new(handler.clone()));
    agent.signup("alice").await.unwrap();

    // A later session unlocks the same key from disk
    let reloaded = KeyVault::load_with_kdf(dir.path(), "alice", "correct horse", TEST_KDF).unwrap();
    let mut agent = ClientAgent::new(reloaded, LoopbackTransport::new(handler));
    agent.log_in("alice").await.unwrap();
    assert_eq!(agent.get_profile().await.unwrap(), "alice");
    agent.logout().await.unwrap();
    assert!(agent.token().is_none());
}

#[test]
fn test_vault_wrong_password() {
    let dir = tempfile::tempdir().unwrap();
    KeyVault::generate(dir.path())
        .with_kdf(TEST_KDF)
        .store("alice", "correct horse")
        .unwrap();

    let result = KeyVault::load_with_kdf(dir.path(), "alice", "battery staple", TEST_KDF);
    assert!(matches!(result, Err(KnockError::DecryptionFailed(_))));
}
