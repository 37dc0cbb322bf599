//! Per-consumer live message taps.
//!
//! Every consumer gets its own bounded queue. Delivery never waits: a full
//! queue drops that consumer's copy and nobody else notices.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Weak,
};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::types::Message;

type Slots = Mutex<Vec<Option<FeedSlot>>>;

struct FeedSlot {
    tx: mpsc::Sender<Message>,
    open: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

/// Outcome of one fan-out pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub accepted: usize,
    pub dropped: usize,
}

/// The live-feed table. Registration may happen from any task while the
/// router delivers, so the slots sit behind a lock that is never held across
/// an `.await`.
#[derive(Clone)]
pub struct FeedHub {
    slots: Arc<Slots>,
    capacity: usize,
}

impl FeedHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn register(&self) -> Feed {
        let (tx, rx) = mpsc::channel(self.capacity);
        let open = Arc::new(AtomicBool::new(true));
        let dropped = Arc::new(AtomicU64::new(0));
        let slot = FeedSlot {
            tx,
            open: Arc::clone(&open),
            dropped: Arc::clone(&dropped),
        };

        let mut slots = self.slots.lock();
        match slots.iter_mut().find(|slot| slot.is_none()) {
            Some(free) => *free = Some(slot),
            None => slots.push(Some(slot)),
        }
        debug!(feeds = slots.len(), "feed: registered");

        Feed {
            rx,
            open,
            dropped,
            hub: Arc::downgrade(&self.slots),
        }
    }

    /// Offers a copy of `msg` to every open feed without blocking.
    /// Closed feeds found along the way are pruned and their slot freed.
    pub fn deliver(&self, msg: &Message) -> Delivery {
        let mut delivery = Delivery::default();
        let mut slots = self.slots.lock();
        for entry in slots.iter_mut() {
            let Some(slot) = entry.as_mut() else {
                continue;
            };
            if !slot.open.load(Ordering::Acquire) {
                *entry = None;
                continue;
            }
            match slot.tx.try_send(msg.clone()) {
                Ok(()) => delivery.accepted += 1,
                Err(TrySendError::Full(_)) => {
                    slot.dropped.fetch_add(1, Ordering::Relaxed);
                    delivery.dropped += 1;
                    trace!(message_id = msg.id.0, "feed: queue full, update dropped");
                }
                Err(TrySendError::Closed(_)) => *entry = None,
            }
        }
        delivery
    }

    /// Stops all feeds. Consumers still drain what was queued, then see the end of the stream.
    pub fn close_all(&self) {
        let mut slots = self.slots.lock();
        for entry in slots.iter_mut() {
            if let Some(slot) = entry.take() {
                slot.open.store(false, Ordering::Release);
            }
        }
        debug!("feed: all feeds closed");
    }

    /// Number of slots currently holding a feed that has not been pruned.
    pub fn live(&self) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|slot| {
                slot.as_ref()
                    .is_some_and(|slot| slot.open.load(Ordering::Acquire))
            })
            .count()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Receiving end of one live feed.
pub struct Feed {
    rx: mpsc::Receiver<Message>,
    open: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    hub: Weak<Slots>,
}

impl Feed {
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Updates lost because this feed's queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Handle that can close this feed from another task.
    pub fn closer(&self) -> FeedCloser {
        FeedCloser {
            open: Arc::clone(&self.open),
            hub: self.hub.clone(),
        }
    }

    pub fn close(&mut self) {
        self.open.store(false, Ordering::Release);
        self.rx.close();
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct FeedCloser {
    open: Arc<AtomicBool>,
    hub: Weak<Slots>,
}

impl FeedCloser {
    /// Closes the feed and frees its slot right away. The consumer still
    /// drains what was already queued, then sees the end of the stream.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        let Some(slots) = self.hub.upgrade() else {
            return;
        };
        let mut slots = slots.lock();
        for entry in slots.iter_mut() {
            if entry
                .as_ref()
                .is_some_and(|slot| Arc::ptr_eq(&slot.open, &self.open))
            {
                *entry = None;
                debug!("feed: closed by handle");
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/feed_tests.rs"]
mod tests;
