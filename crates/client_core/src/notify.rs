use shared::domain::MessageId;

use crate::types::Message;

/// Decides which mentions are new replies worth a notification.
///
/// Edits re-deliver a mention with the same ID, and a late resync can replay
/// older ones; neither should notify twice.
#[derive(Debug, Default, Clone)]
pub struct ReplyTracker {
    last_id: Option<MessageId>,
    /// Revision time of the last notified mention.
    last_date: i64,
}

impl ReplyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `msg` is a chat mention revised no earlier than the last one
    /// notified and not that same message again. Edited messages count from
    /// their edit date.
    pub fn observe(&mut self, msg: &Message) -> bool {
        if !msg.is_chat() || !msg.is_mention {
            return false;
        }
        let revised = msg.revised_at();
        if revised < self.last_date || self.last_id == Some(msg.id) {
            return false;
        }
        self.last_id = Some(msg.id);
        self.last_date = revised;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageKind;

    fn mention(id: u32, created_at: i64) -> Message {
        Message {
            id: MessageId(id),
            created_at,
            is_mention: true,
            ..Message::default()
        }
    }

    #[test]
    fn notifies_each_new_mention_once() {
        let mut tracker = ReplyTracker::new();
        assert!(tracker.observe(&mention(4, 100)));
        assert!(!tracker.observe(&mention(4, 100)), "edit of the same mention");
        assert!(tracker.observe(&mention(5, 100)));
        assert!(!tracker.observe(&mention(3, 90)), "older mention replayed");
    }

    #[test]
    fn edited_mentions_are_dated_by_their_edit() {
        let mut tracker = ReplyTracker::new();
        assert!(tracker.observe(&mention(5, 200)));

        let mut late_edit = mention(3, 100);
        late_edit.edited_at = 300;
        assert!(tracker.observe(&late_edit), "edited after the last mention");

        assert!(!tracker.observe(&mention(6, 250)), "older than the edit");
    }

    #[test]
    fn ignores_plain_and_status_messages() {
        let mut tracker = ReplyTracker::new();
        let mut plain = mention(1, 10);
        plain.is_mention = false;
        assert!(!tracker.observe(&plain));

        let mut status = mention(2, 10);
        status.kind = MessageKind::System;
        assert!(!tracker.observe(&status));
    }
}
