//! Client-side handshake driver and its transport seam

pub mod agent;
pub mod transport;

pub use agent::ClientAgent;
pub use transport::{LoopbackTransport, Transport};
