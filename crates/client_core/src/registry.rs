use std::sync::{Arc, OnceLock};

use dashmap::{mapref::entry::Entry, DashMap};
use shared::domain::{UserId, SYSTEM_USER_ID};
use tracing::{debug, info};

use crate::{
    pool::ObjectPool,
    types::{User, UserColor},
};

const SYSTEM_USER_NAME: &str = "sockchat";

/// Canonical user records, one per ID for the lifetime of the process.
///
/// Only `add` and `query` touch the map, so no caller can hold two distinct
/// records for the same ID.
pub struct UserRegistry {
    users: DashMap<UserId, Arc<User>>,
    client_id: Option<UserId>,
    client_name: OnceLock<String>,
    system_user: Arc<User>,
    pool: Arc<ObjectPool>,
}

impl UserRegistry {
    pub fn new(client_id: Option<UserId>, pool: Arc<ObjectPool>) -> Self {
        Self {
            users: DashMap::new(),
            client_id,
            client_name: OnceLock::new(),
            system_user: Arc::new(User {
                id: SYSTEM_USER_ID,
                username: SYSTEM_USER_NAME.to_string(),
                avatar_url: String::new(),
                color: UserColor::default(),
            }),
            pool,
        }
    }

    /// Stores `user` unless a record for its ID already exists, and returns the canonical record.
    ///
    /// First write wins: a colliding value is handed back to the pool.
    pub fn add(&self, mut user: User) -> Arc<User> {
        let canonical = match self.users.entry(user.id) {
            Entry::Occupied(entry) => {
                let canonical = Arc::clone(entry.get());
                drop(entry);
                self.pool.release_user(user);
                return canonical;
            }
            Entry::Vacant(entry) => {
                user.color = UserColor::for_user(user.id);
                let canonical = Arc::new(user);
                entry.insert(Arc::clone(&canonical));
                canonical
            }
        };

        debug!(
            user_id = canonical.id.0,
            username = %canonical.username,
            "registry: added user"
        );
        if self.client_id == Some(canonical.id)
            && self.client_name.set(canonical.username.clone()).is_ok()
        {
            info!(username = %canonical.username, "registry: resolved own display name");
        }

        canonical
    }

    pub fn query(&self, id: UserId) -> Option<Arc<User>> {
        self.users.get(&id).map(|user| Arc::clone(user.value()))
    }

    /// The client's own display name, empty until its user record has been seen.
    pub fn client_name(&self) -> &str {
        self.client_name.get().map(String::as_str).unwrap_or_default()
    }

    pub fn client_id(&self) -> Option<UserId> {
        self.client_id
    }

    /// Author of locally produced status messages.
    pub fn system_user(&self) -> Arc<User> {
        Arc::clone(&self.system_user)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
