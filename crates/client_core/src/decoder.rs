use std::{collections::BTreeMap, sync::Arc};

use serde_json::value::RawValue;
use shared::protocol::{ServerFrame, WireMessage, WireUser};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::ProtocolError,
    markup,
    pool::ObjectPool,
    registry::UserRegistry,
    router::{RouterHandle, StatusReporter},
    types::{Message, MessageKind, User},
};

/// Result of decoding one frame.
#[derive(Debug, Default)]
pub struct Decoded {
    /// Messages in frame order, authors already resolved to canonical records.
    pub messages: Vec<Message>,
    /// Number of user elements handed to the registry.
    pub users: usize,
    /// Elements that were skipped, one entry each.
    pub errors: Vec<ProtocolError>,
}

impl Decoded {
    pub fn joined_errors(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub struct Decoder {
    registry: Arc<UserRegistry>,
    pool: Arc<ObjectPool>,
}

impl Decoder {
    pub fn new(registry: Arc<UserRegistry>, pool: Arc<ObjectPool>) -> Self {
        Self { registry, pool }
    }

    /// Decodes a JSON frame. Only a frame that is not a JSON object at all fails as a whole;
    /// malformed elements are collected in [`Decoded::errors`] without stopping their siblings.
    pub fn decode(&self, frame: &str) -> Result<Decoded, ProtocolError> {
        let parsed: ServerFrame =
            serde_json::from_str(frame).map_err(|source| ProtocolError::Frame { source })?;

        let mut decoded = Decoded::default();
        // Users first so that authors and the client's own name resolve before messages are routed.
        if let Some(users) = parsed.users.as_deref() {
            self.decode_users(users, &mut decoded);
        }
        if let Some(messages) = parsed.messages.as_deref() {
            self.decode_messages(messages, &mut decoded);
        }
        Ok(decoded)
    }

    fn decode_users(&self, raw: &RawValue, decoded: &mut Decoded) {
        let text = raw.get();
        let elements: Vec<(String, &RawValue)> = if text.trim_start().starts_with('{') {
            match serde_json::from_str::<BTreeMap<String, &RawValue>>(text) {
                Ok(map) => map.into_iter().collect(),
                Err(source) => {
                    decoded.errors.push(ProtocolError::UserList { source });
                    return;
                }
            }
        } else {
            match serde_json::from_str::<Vec<&RawValue>>(text) {
                Ok(list) => list
                    .into_iter()
                    .enumerate()
                    .map(|(index, raw)| (index.to_string(), raw))
                    .collect(),
                Err(source) => {
                    decoded.errors.push(ProtocolError::UserList { source });
                    return;
                }
            }
        };

        for (key, raw) in elements {
            match serde_json::from_str::<WireUser<'_>>(raw.get()) {
                Ok(wire) => {
                    self.registry.add(self.materialize_user(&wire));
                    decoded.users += 1;
                }
                Err(source) => decoded.errors.push(ProtocolError::User { key, source }),
            }
        }
    }

    fn decode_messages(&self, raw: &RawValue, decoded: &mut Decoded) {
        let elements = match serde_json::from_str::<Vec<&RawValue>>(raw.get()) {
            Ok(elements) => elements,
            Err(source) => {
                decoded.errors.push(ProtocolError::MessageList { source });
                return;
            }
        };

        decoded.messages.reserve(elements.len());
        for (index, raw) in elements.into_iter().enumerate() {
            match serde_json::from_str::<WireMessage<'_>>(raw.get()) {
                Ok(wire) => decoded.messages.push(self.materialize_message(&wire)),
                Err(source) => decoded.errors.push(ProtocolError::Message { index, source }),
            }
        }
    }

    fn materialize_user(&self, wire: &WireUser<'_>) -> User {
        let mut user = self.pool.new_user();
        user.id = wire.id;
        user.username.push_str(&wire.username);
        user.avatar_url.push_str(&wire.avatar_url);
        user
    }

    fn materialize_message(&self, wire: &WireMessage<'_>) -> Message {
        let mut msg = self.pool.new_message();
        msg.id = wire.message_id;
        msg.body.push_str(&wire.message);
        markup::unescape_into(&wire.message_raw, &mut msg.body_raw);
        msg.created_at = wire.message_date;
        msg.edited_at = wire.message_edit_date;
        msg.room = wire.room_id;
        msg.kind = MessageKind::Chat;
        // The embedded author may be stale; the registry record wins.
        msg.author = Some(match self.registry.query(wire.author.id) {
            Some(canonical) => canonical,
            None => self.registry.add(self.materialize_user(&wire.author)),
        });
        msg
    }

    /// Decodes frames from the transport until cancelled, forwarding messages to the router in order.
    pub async fn run(
        self,
        mut frames: mpsc::Receiver<String>,
        router: RouterHandle,
        status: StatusReporter,
        cancel: CancellationToken,
    ) {
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            let decoded = match self.decode(&frame) {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!(error = %err, "decoder: rejected frame");
                    status.info(format!("Failed to parse server response.\nResponse: {frame}"));
                    continue;
                }
            };

            if !decoded.errors.is_empty() {
                let joined = decoded.joined_errors();
                warn!(
                    count = decoded.errors.len(),
                    errors = %joined,
                    "decoder: skipped malformed elements"
                );
                status.debug(format!("Skipped malformed server data: {joined}"));
            }
            debug!(
                messages = decoded.messages.len(),
                users = decoded.users,
                "decoder: frame decoded"
            );

            for msg in decoded.messages {
                if router.submit(msg).await.is_err() {
                    return;
                }
            }
        }
        debug!("decoder: stopped");
    }
}

#[cfg(test)]
#[path = "tests/decoder_tests.rs"]
mod tests;
