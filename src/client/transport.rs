//! Request/response transport seam
//!
//! The protocol only needs "send a field map, get a field map back". The
//! loopback transport round-trips every message through JSON text so that
//! nothing but strings crosses the boundary, the same as a network hop.

use async_trait::async_trait;
use tracing::debug;

use crate::protocol::{Fields, ProtocolHandler};
use crate::types::Result;

/// Carries one request to a server and returns its response
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(&self, request: Fields) -> Result<Fields>;
}

/// In-process transport straight into a [`ProtocolHandler`]
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    handler: ProtocolHandler,
}

impl LoopbackTransport {
    pub fn new(handler: ProtocolHandler) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &ProtocolHandler {
        &self.handler
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn exchange(&self, request: Fields) -> Result<Fields> {
        let wire = serde_json::to_string(&request)?;
        debug!(bytes = wire.len(), "loopback request");

        let received: Fields = serde_json::from_str(&wire)?;
        let reply = serde_json::to_string(&self.handler.handle_fields(&received))?;
        debug!(bytes = reply.len(), "loopback response");

        Ok(serde_json::from_str(&reply)?)
    }
}
