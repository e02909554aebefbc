//! Shared types

pub mod error;

pub use error::{KnockError, Result};
