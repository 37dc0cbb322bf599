use std::io;

pub use shared::error::ProtocolError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] tungstenite::Error),
    #[error("invalid handshake header {name}: {reason}")]
    Header { name: &'static str, reason: String },
    #[error("failed to read from socket: {0}")]
    Read(#[source] tungstenite::Error),
    #[error("failed to write to socket: {0}")]
    Write(#[source] tungstenite::Error),
    #[error("socket closed by server")]
    ClosedByPeer,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("session expired: {0}")]
    SessionExpired(String),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("chat client is closed")]
    Closed,
    #[error("outgoing message is empty")]
    EmptyCommand,
}

impl ClientError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Errors the connection state machine recovers from by reconnecting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::SessionExpired(_))
    }
}
