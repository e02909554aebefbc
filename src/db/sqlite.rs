//! SQLite-backed identity store
//!
//! One row per identity in `users`, keyed uniquely on username. The
//! public key is stored as base64 text of its SubjectPublicKeyInfo DER.

use std::path::Path;
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::auth::IdentityStore;
use crate::types::{KnockError, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    username   TEXT PRIMARY KEY NOT NULL,
    public_key TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

/// Identity store on a SQLite database
pub struct SqliteIdentityStore {
    conn: Mutex<Connection>,
}

impl SqliteIdentityStore {
    /// Open or create the identity database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening identity database at {:?}", path);

        let conn = Connection::open(path).map_err(|e| {
            KnockError::StorageUnavailable(format!("Failed to open SQLite: {}", e))
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| KnockError::StorageUnavailable(format!("Failed to set PRAGMA: {}", e)))?;

        Self::with_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory identity database");

        let conn = Connection::open_in_memory().map_err(|e| {
            KnockError::StorageUnavailable(format!("Failed to open in-memory SQLite: {}", e))
        })?;

        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| KnockError::StorageUnavailable(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Number of registered identities
    pub fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }
}

impl IdentityStore for SqliteIdentityStore {
    fn insert_if_absent(&self, username: &str, public_key: &[u8]) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO users (username, public_key, created_at) VALUES (?1, ?2, ?3)",
                params![username, BASE64.encode(public_key), Utc::now().to_rfc3339()],
            )?;

            if changed == 0 {
                debug!("Username {} already present in identity table", username);
            }
            Ok(changed == 1)
        })
    }

    fn lookup(&self, username: &str) -> Result<Option<Vec<u8>>> {
        let encoded: Option<String> = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT public_key FROM users WHERE username = ?1",
                    params![username],
                    |row| row.get(0),
                )
                .optional()?)
        })?;

        match encoded {
            Some(text) => BASE64.decode(text).map(Some).map_err(|e| {
                warn!("Undecodable public key stored for {}: {}", username, e);
                KnockError::Internal(format!("Stored public key for {username} is corrupt"))
            }),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for SqliteIdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIdentityStore").finish_non_exhaustive()
    }
}
