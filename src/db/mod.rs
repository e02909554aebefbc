//! Relational identity storage

pub mod sqlite;

pub use sqlite::SqliteIdentityStore;
