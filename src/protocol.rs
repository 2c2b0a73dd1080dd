//! Game-protocol client seam.
//!
//! The registry drives every session through these traits and never sees the
//! transport underneath. The real TCP client lives in [`crate::wire`]; tests
//! substitute a scripted connector.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Errors surfaced by a protocol client.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connection closed")]
    Closed,
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Events a live connection emits, in arrival order.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The player entered the world; in-session actions may begin.
    Spawned,
    /// Chat line relayed from the server.
    Chat { user: String, message: String },
    /// The connection ended, for any reason.
    Disconnected,
    /// Non-fatal error; the disconnect, if any, follows separately.
    Error(String),
}

/// Handle to one live connection.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Send a chat line (or slash command) through the connection.
    async fn send_chat(&self, message: &str) -> Result<(), ProtocolError>;

    /// Assert or release the jump control.
    async fn set_jump(&self, engaged: bool) -> Result<(), ProtocolError>;

    /// Ask the remote side to close the connection. Idempotent.
    async fn close(&self);
}

/// Opens connections; one implementation per transport.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(
        &self,
        host: &str,
        username: &str,
    ) -> Result<(Arc<dyn ProtocolClient>, mpsc::Receiver<ClientEvent>), ProtocolError>;
}
