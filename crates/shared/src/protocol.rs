use std::borrow::Cow;

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::domain::{MessageId, RoomId, UserId};

/// Path of the chat socket on the server.
pub const SOCKET_PATH: &str = "/chat.ws";
/// Prefix of the outbound room-join control command.
pub const JOIN_PREFIX: &str = "/join ";
/// Substring of the plain-text reply the server sends once the session cookie stops working.
pub const SESSION_EXPIRED_MARKER: &str = "cannot join";

/// Top level of an inbound JSON frame.
///
/// Both parts are kept raw so that every element can be decoded on its own
/// and one malformed entry does not poison its siblings.
#[derive(Debug, Default, Deserialize)]
pub struct ServerFrame {
    #[serde(default)]
    pub messages: Option<Box<RawValue>>,
    #[serde(default)]
    pub users: Option<Box<RawValue>>,
}

#[derive(Debug, Deserialize)]
pub struct WireUser<'a> {
    pub id: UserId,
    #[serde(borrow, default)]
    pub username: Cow<'a, str>,
    #[serde(borrow, default)]
    pub avatar_url: Cow<'a, str>,
}

#[derive(Debug, Deserialize)]
pub struct WireMessage<'a> {
    #[serde(borrow)]
    pub author: WireUser<'a>,
    #[serde(borrow, default)]
    pub message: Cow<'a, str>,
    #[serde(borrow, default)]
    pub message_raw: Cow<'a, str>,
    pub message_id: MessageId,
    #[serde(default)]
    pub message_date: i64,
    #[serde(default)]
    pub message_edit_date: i64,
    #[serde(default)]
    pub room_id: RoomId,
}

/// How a plain text socket frame should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Json,
    SessionExpired,
    Notice,
}

pub fn classify_frame(text: &str) -> FrameKind {
    if serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok() {
        FrameKind::Json
    } else if text.contains(SESSION_EXPIRED_MARKER) {
        FrameKind::SessionExpired
    } else {
        FrameKind::Notice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_json_and_plain_text_frames() {
        assert_eq!(classify_frame(r#"{"messages":[]}"#), FrameKind::Json);
        assert_eq!(
            classify_frame("You cannot join this room."),
            FrameKind::SessionExpired
        );
        assert_eq!(classify_frame("Room is read only."), FrameKind::Notice);
    }

    #[test]
    fn wire_message_borrows_and_defaults_missing_fields() {
        let msg: WireMessage<'_> = serde_json::from_str(
            r#"{"author":{"id":4,"username":"ann"},"message_id":9,"message_raw":"hi"}"#,
        )
        .expect("decode");
        assert_eq!(msg.author.id, UserId(4));
        assert_eq!(msg.message_id, MessageId(9));
        assert_eq!(msg.message_edit_date, 0);
        assert!(matches!(msg.message_raw, Cow::Borrowed("hi")));
    }
}
