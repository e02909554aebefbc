//! Tracing subscriber setup
//!
//! `RUST_LOG` wins when set; otherwise the crate logs at the requested
//! level and everything else at `info`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::types::{KnockError, Result};

/// Default filter directive for a given crate log level
pub fn default_directive(level: &str) -> String {
    format!("keyknock={},info", level)
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(level).into());

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    installed.map_err(|e| KnockError::Config(format!("Cannot install tracing subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_parses() {
        let directive = default_directive("debug");
        assert_eq!(directive, "keyknock=debug,info");
        assert!(EnvFilter::try_new(&directive).is_ok());
    }
}
