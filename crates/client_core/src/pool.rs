//! Free lists for the records created on the inbound hot path.
//!
//! Decoded messages and users are filled into recycled values so their string
//! buffers keep their capacity between frames. Ownership does the rest: a
//! released value has been moved into the pool and cannot be touched by its
//! previous owner.

use parking_lot::Mutex;

use crate::types::{Message, User};

const DEFAULT_POOL_CAPACITY: usize = 1024;

pub trait Recycle: Default {
    /// Drop identifying data and references while keeping allocations.
    fn recycle(&mut self);
}

impl Recycle for Message {
    fn recycle(&mut self) {
        self.clear();
    }
}

impl Recycle for User {
    fn recycle(&mut self) {
        self.clear();
    }
}

pub struct FreeList<T: Recycle> {
    items: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T: Recycle> FreeList<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub fn take(&self) -> T {
        self.items.lock().pop().unwrap_or_default()
    }

    /// Clears `item` and keeps it for reuse; beyond capacity it is simply dropped.
    pub fn put(&self, mut item: T) {
        item.recycle();
        let mut items = self.items.lock();
        if items.len() < self.capacity {
            items.push(item);
        }
    }

    pub fn idle(&self) -> usize {
        self.items.lock().len()
    }
}

pub struct ObjectPool {
    messages: FreeList<Message>,
    users: FreeList<User>,
}

impl Default for ObjectPool {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }
}

impl ObjectPool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: FreeList::new(capacity),
            users: FreeList::new(capacity),
        }
    }

    pub fn new_message(&self) -> Message {
        self.messages.take()
    }

    pub fn new_user(&self) -> User {
        self.users.take()
    }

    pub fn release_message(&self, msg: Message) {
        self.messages.put(msg);
    }

    pub fn release_user(&self, user: User) {
        self.users.put(user);
    }

    pub fn idle_messages(&self) -> usize {
        self.messages.idle()
    }

    pub fn idle_users(&self) -> usize {
        self.users.idle()
    }
}

#[cfg(test)]
#[path = "tests/pool_tests.rs"]
mod tests;
