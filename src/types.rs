use derive_more::{Display, Into};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::csrf;

/// Opaque session identifier carried in the session cookie.
///
/// Generated by the session store from 32 random bytes. Values read back from
/// a cookie go through [`SessionId::parse`], which rejects anything that could
/// not have been issued by [`SessionId::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Display, Into)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Allocate a fresh, unguessable identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(csrf::generate_session_id())
    }

    /// Accept an identifier from an untrusted source, `None` if malformed.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        csrf::is_well_formed_session_id(s).then(|| Self(s.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Email address used as the unique key of a [`UserRecord`].
///
/// Normalized to trimmed lowercase on construction so that lookups and the
/// storage uniqueness constraint agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Into)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Local user record, created on first successful login for an email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Provider principal name at first login.
    pub username: String,
    pub email: Email,
    pub display_name: String,
}

/// Data bound to a session identifier.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionData {
    pub access_token: String,
    pub user_email: Option<Email>,
    pub expires_at: OffsetDateTime,
}

impl SessionData {
    /// Session holding `access_token`, valid for `ttl` from now.
    #[must_use]
    pub fn new(access_token: impl Into<String>, user_email: Option<Email>, ttl: Duration) -> Self {
        Self {
            access_token: access_token.into(),
            user_email,
            expires_at: OffsetDateTime::now_utc() + ttl,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= OffsetDateTime::now_utc()
    }

    /// A session without an access token, or past its lifetime, grants nothing.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }
}

impl std::fmt::Debug for SessionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionData")
            .field("access_token", &"[redacted]")
            .field("user_email", &self.user_email)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
