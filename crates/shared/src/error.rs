use thiserror::Error;

/// Decoding failure for one inbound frame or for one element inside it.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to parse server response: {source}")]
    Frame {
        #[source]
        source: serde_json::Error,
    },
    #[error("`messages` is not an array: {source}")]
    MessageList {
        #[source]
        source: serde_json::Error,
    },
    #[error("`users` is neither an object nor an array: {source}")]
    UserList {
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed message at index {index}: {source}")]
    Message {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed user {key}: {source}")]
    User {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// True when the whole frame was rejected rather than one element of it.
    pub fn is_frame_level(&self) -> bool {
        matches!(self, Self::Frame { .. })
    }
}
