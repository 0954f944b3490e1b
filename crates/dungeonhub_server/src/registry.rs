//! User-to-session uniqueness.
//!
//! The registry guarantees that a user id maps to at most one live session.
//! Re-registering the same session with a new user releases its previous
//! binding first.

use std::collections::HashMap;

use crate::session::{SessionId, UserContext};

#[derive(Debug, Default)]
pub struct SessionRegistry {
    records: HashMap<SessionId, UserContext>,
    active_users: HashMap<String, SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `record.user_id` to `id`. Fails if another session already
    /// holds the user.
    pub fn register_session(&mut self, id: SessionId, record: UserContext) -> bool {
        if let Some(&existing) = self.active_users.get(&record.user_id) {
            if existing != id {
                return false;
            }
        }
        if let Some(previous) = self.records.get(&id) {
            self.active_users.remove(&previous.user_id);
        }
        self.active_users.insert(record.user_id.clone(), id);
        self.records.insert(id, record);
        true
    }

    pub fn remove_session(&mut self, id: SessionId) {
        if let Some(record) = self.records.remove(&id) {
            self.active_users.remove(&record.user_id);
        }
    }

    pub fn find(&self, id: SessionId) -> Option<&UserContext> {
        self.records.get(&id)
    }

    /// Session currently bound to `user_id`, if any.
    pub fn session_for_user(&self, user_id: &str) -> Option<SessionId> {
        self.active_users.get(user_id).copied()
    }
}
