use dashmap::DashMap;

use super::{SessionStore, UserRepository};
use crate::error::Error;
use crate::types::{Email, SessionData, SessionId, UserRecord};

/// Process-local session store.
///
/// Sessions vanish on restart. Expired entries are dropped lazily on lookup
/// and in bulk by [`SessionStore::purge_expired`].
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<SessionId, SessionData>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    async fn create(&self, data: SessionData) -> Result<SessionId, Error> {
        let id = SessionId::generate();
        self.sessions.insert(id.clone(), data);
        Ok(id)
    }

    async fn get(&self, id: &SessionId) -> Result<Option<SessionData>, Error> {
        let Some(entry) = self.sessions.get(id) else {
            return Ok(None);
        };
        if entry.is_expired() {
            drop(entry);
            self.sessions.remove_if(id, |_, data| data.is_expired());
            return Ok(None);
        }
        Ok(Some(entry.value().clone()))
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), Error> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, Error> {
        let before = self.sessions.len();
        self.sessions.retain(|_, data| !data.is_expired());
        Ok(before.saturating_sub(self.sessions.len()))
    }
}

/// Process-local user repository.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: DashMap<Email, UserRecord>,
}

impl MemoryUserRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserRepository for MemoryUserRepository {
    async fn find_by_email(&self, email: &Email) -> Result<Option<UserRecord>, Error> {
        Ok(self.users.get(email).map(|r| r.value().clone()))
    }

    async fn upsert_if_absent(&self, candidate: UserRecord) -> Result<UserRecord, Error> {
        // The entry guard holds the shard lock, making check-then-insert atomic.
        let stored = self
            .users
            .entry(candidate.email.clone())
            .or_insert(candidate);
        Ok(stored.value().clone())
    }
}
