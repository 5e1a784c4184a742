//! Session and user persistence.
//!
//! The flow talks to storage only through [`SessionStore`] and
//! [`UserRepository`]. In-memory implementations live in [`memory`];
//! SQLite-backed ones in [`sqlite`] (feature `sqlite`).

use std::future::Future;

use crate::error::Error;
use crate::types::{Email, SessionData, SessionId, UserRecord};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{MemorySessionStore, MemoryUserRepository};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteSessionStore, SqliteUserRepository};

/// Maps an opaque session identifier to [`SessionData`].
///
/// Operations on distinct identifiers are independent. Concurrent writes to
/// the same identifier resolve last-write-wins.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for MyStore {
///     async fn create(&self, data: SessionData) -> Result<SessionId, Error> {
///         let id = SessionId::generate();
///         self.db.insert_session(&id, &data).await?;
///         Ok(id)
///     }
///
///     async fn get(&self, id: &SessionId) -> Result<Option<SessionData>, Error> {
///         self.db.find_live_session(id).await
///     }
///
///     async fn destroy(&self, id: &SessionId) -> Result<(), Error> {
///         self.db.delete_session(id).await
///     }
///
///     async fn purge_expired(&self) -> Result<usize, Error> {
///         self.db.delete_expired_sessions().await
///     }
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Allocate a new session. The identifier must be unguessable.
    fn create(&self, data: SessionData) -> impl Future<Output = Result<SessionId, Error>> + Send;

    /// Look up a live session. Absent and expired sessions are `None`.
    fn get(&self, id: &SessionId) -> impl Future<Output = Result<Option<SessionData>, Error>> + Send;

    /// Remove a session. Destroying an unknown session is not an error.
    fn destroy(&self, id: &SessionId) -> impl Future<Output = Result<(), Error>> + Send;

    /// Drop every expired session, returning how many were removed.
    fn purge_expired(&self) -> impl Future<Output = Result<usize, Error>> + Send;
}

/// Durable user records keyed by email.
pub trait UserRepository: Send + Sync + 'static {
    fn find_by_email(&self, email: &Email) -> impl Future<Output = Result<Option<UserRecord>, Error>> + Send;

    /// Insert `candidate` unless a record with its email exists; return the stored record.
    ///
    /// Must be a single atomic check-then-insert: concurrent callers with the
    /// same email all observe the same record and exactly one row exists.
    fn upsert_if_absent(&self, candidate: UserRecord) -> impl Future<Output = Result<UserRecord, Error>> + Send;
}
