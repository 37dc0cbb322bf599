use shared::{domain::RoomId, protocol::JOIN_PREFIX};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

/// Color used for greentext lines; readable on the site's dark theme.
pub const GREENTEXT_COLOR: &str = "#72ff72";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    Join(RoomId),
    Say(String),
}

impl OutboundCommand {
    /// Trims `text` and recognises `/join <room>`. Anything else is chat.
    pub fn parse(text: &str) -> Result<Self, ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyCommand);
        }

        // Only `/join <digits>` with nothing after the number is a room change.
        let room = text
            .strip_prefix(JOIN_PREFIX)
            .filter(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|room| room.parse::<u32>().ok());
        Ok(match room {
            Some(room) => Self::Join(RoomId(room)),
            None => Self::Say(text.to_string()),
        })
    }

    pub fn is_join(&self) -> bool {
        matches!(self, Self::Join(_))
    }

    /// Text written to the socket.
    pub fn payload(&self) -> String {
        match self {
            Self::Join(room) => format!("{JOIN_PREFIX}{room}"),
            Self::Say(text) if is_greentext(text) => format!("[color={GREENTEXT_COLOR}]{text}"),
            Self::Say(text) => text.clone(),
        }
    }
}

fn is_greentext(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next() == Some('>') && chars.next().is_some_and(|ch| ch.is_alphanumeric() || ch == '_')
}

/// Read-only (lurker) gating: only room joins reach the socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboundPolicy {
    pub read_only: bool,
}

impl OutboundPolicy {
    pub fn admits(&self, command: &OutboundCommand) -> bool {
        !self.read_only || command.is_join()
    }
}

/// Cloneable handle the UI uses to queue outgoing text.
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl CommandSender {
    pub fn new(tx: mpsc::Sender<String>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Queues `text` for the writer. Empty input is rejected; once the client
    /// is shutting down this fails immediately instead of waiting for room.
    pub async fn send(&self, text: &str) -> Result<(), ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyCommand);
        }
        if self.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClientError::Closed),
            sent = self.tx.send(text.to_string()) => sent.map_err(|_| ClientError::Closed),
        }
    }

    pub async fn join(&self, room: RoomId) -> Result<(), ClientError> {
        self.send(&OutboundCommand::Join(room).payload()).await
    }
}

#[cfg(test)]
#[path = "tests/outbound_tests.rs"]
mod tests;
