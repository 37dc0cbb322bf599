use std::{collections::VecDeque, sync::Arc};

use shared::domain::MessageId;
use tracing::debug;

use crate::{
    pool::ObjectPool,
    types::{HistorySnapshot, Message},
};

/// What [`History::ingest`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Added as the newest entry.
    Appended,
    /// Replaced the entry at this position.
    Edited(usize),
    /// An edit for a message that is no longer in the window; discarded.
    Orphaned,
}

/// Bounded, ordered message window.
///
/// Owned by the router task alone. Entries leave only by eviction or by being
/// superseded by an edit, and go straight back to the pool when they do.
pub struct History {
    entries: VecDeque<Message>,
    capacity: usize,
    last_seen: MessageId,
    pool: Arc<ObjectPool>,
}

impl History {
    pub fn new(capacity: usize, pool: Arc<ObjectPool>) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            last_seen: MessageId::default(),
            pool,
        }
    }

    /// Edits of already-seen messages carry an ID at or below the watermark.
    /// Messages edited before the client connected arrive with an edit stamp
    /// but a new ID, and are appended like any other.
    pub fn is_edit(&self, msg: &Message) -> bool {
        msg.is_edited() && msg.id <= self.last_seen
    }

    pub fn ingest(&mut self, msg: Message) -> Ingest {
        if self.is_edit(&msg) {
            return self.splice(msg);
        }

        self.last_seen = self.last_seen.max(msg.id);
        self.entries.push_back(msg);
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                self.pool.release_message(evicted);
            }
        }
        Ingest::Appended
    }

    fn splice(&mut self, msg: Message) -> Ingest {
        match self.entries.iter().position(|entry| entry.id == msg.id) {
            Some(index) => {
                let superseded = std::mem::replace(&mut self.entries[index], msg);
                self.pool.release_message(superseded);
                Ingest::Edited(index)
            }
            None => {
                debug!(message_id = msg.id.0, "history: edit outside window dropped");
                self.pool.release_message(msg);
                Ingest::Orphaned
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.entries.get(index)
    }

    pub fn latest(&self) -> Option<&Message> {
        self.entries.back()
    }

    pub fn last_seen(&self) -> MessageId {
        self.last_seen
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot::new(self.entries.iter().cloned().collect())
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
