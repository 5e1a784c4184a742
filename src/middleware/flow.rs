//! The authentication state machine.
//!
//! A browser moves `Anonymous -> AwaitingCallback -> Authenticated` and back
//! to `Anonymous` on logout or on any authentication failure. The only local
//! trace of `AwaitingCallback` is the state token returned by [`AuthFlow::login`],
//! which the HTTP layer keeps in a private cookie and hands back to
//! [`AuthFlow::callback`].

use serde::Deserialize;
use time::Duration;
use url::Url;

use super::error::AuthError;
use crate::csrf;
use crate::error::Error;
use crate::oauth::{Identity, IdentityProvider};
use crate::store::{SessionStore, UserRepository};
use crate::types::{Email, SessionData, SessionId, UserRecord};

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Where to send the browser, and the state to remember until the callback.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LoginRedirect {
    pub url: Url,
    pub state: String,
}

/// Orchestrates provider, user repository and session store.
pub struct AuthFlow<P, U, S> {
    provider: P,
    users: U,
    sessions: S,
    redirect_uri: Url,
    scopes: Vec<String>,
    session_ttl: Duration,
}

impl<P, U, S> AuthFlow<P, U, S>
where
    P: IdentityProvider,
    U: UserRepository,
    S: SessionStore,
{
    #[must_use]
    pub fn new(
        provider: P,
        users: U,
        sessions: S,
        redirect_uri: Url,
        scopes: Vec<String>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            provider,
            users,
            sessions,
            redirect_uri,
            scopes,
            session_ttl,
        }
    }

    #[must_use]
    pub fn users(&self) -> &U {
        &self.users
    }

    #[must_use]
    pub fn sessions(&self) -> &S {
        &self.sessions
    }

    /// Start an authorization request. No side effects beyond generating the state.
    #[must_use]
    pub fn login(&self) -> LoginRedirect {
        let state = csrf::generate_state();
        let url = self
            .provider
            .build_authorization_url(&self.scopes, &self.redirect_uri, &state);
        LoginRedirect { url, state }
    }

    /// Complete an authorization request and establish a session.
    ///
    /// `expected_state` is the state issued by [`login`](Self::login) for this
    /// browser, if any. `current` is the session the browser already holds; it
    /// is ended once the new one is established.
    ///
    /// The new session and a first-login user record are written as one unit:
    /// the session is created first and removed again if the user write fails,
    /// so every failure leaves both stores as they were.
    ///
    /// # Errors
    ///
    /// - [`AuthError::ProviderRejected`] if the provider reported an error
    /// - [`AuthError::StateMismatch`] if the state is missing or differs
    /// - [`AuthError::AuthenticationFailed`] if the code is missing, the
    ///   exchange fails or the identity cannot be fetched
    /// - [`AuthError::StorageUnavailable`] if user or session storage fails
    pub async fn callback(
        &self,
        params: &CallbackParams,
        expected_state: Option<&str>,
        current: Option<&SessionId>,
    ) -> Result<SessionId, AuthError> {
        if let Some(error) = &params.error {
            let desc = params.error_description.as_deref().unwrap_or(error);
            tracing::warn!(error = %error, description = %desc, "OAuth2 error from provider");
            return Err(AuthError::ProviderRejected(desc.to_string()));
        }

        let state_ok = match (params.state.as_deref(), expected_state) {
            (Some(received), Some(expected)) => csrf::states_match(received, expected),
            _ => false,
        };
        if !state_ok {
            tracing::warn!("OAuth state mismatch");
            return Err(AuthError::StateMismatch);
        }

        let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
            tracing::warn!("Callback without authorization code");
            return Err(AuthError::AuthenticationFailed);
        };

        let grant = self
            .provider
            .exchange_code_for_token(code, &self.redirect_uri, &self.scopes)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Token exchange failed");
                AuthError::AuthenticationFailed
            })?;

        let identity = self
            .provider
            .fetch_identity(&grant.access_token)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Identity request failed");
                AuthError::AuthenticationFailed
            })?;

        let email = Email::new(&identity.email);
        let session = SessionData::new(grant.access_token, Some(email), self.session_ttl);
        let session_id = self.sessions.create(session).await.map_err(|e| {
            tracing::error!(error = %e, "Session creation failed");
            AuthError::from(e)
        })?;

        // The session id has not left this call yet, so removing it cannot race.
        if let Err(e) = self.ensure_user(&identity).await {
            if let Err(undo) = self.sessions.destroy(&session_id).await {
                tracing::error!(error = %undo, "Could not remove session after user write failure");
            }
            return Err(e);
        }

        if let Some(previous) = current.filter(|p| **p != session_id) {
            if let Err(e) = self.sessions.destroy(previous).await {
                tracing::warn!(error = %e, "Could not end previous session");
            }
        }

        tracing::info!(principal = %identity.principal_name, "OAuth2 login successful");
        Ok(session_id)
    }

    /// Resolve a live, token-bearing session.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthenticated`] if there is none; storage failures as
    /// [`AuthError::StorageUnavailable`].
    pub async fn session(&self, session_id: Option<&SessionId>) -> Result<SessionData, AuthError> {
        let Some(id) = session_id else {
            return Err(AuthError::Unauthenticated);
        };
        match self.sessions.get(id).await? {
            Some(data) if data.is_authenticated() => Ok(data),
            _ => Err(AuthError::Unauthenticated),
        }
    }

    /// Fetch the current identity for an authenticated session.
    ///
    /// A token the provider no longer accepts ends the session.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthenticated`] when the caller must log in again;
    /// storage failures as [`AuthError::StorageUnavailable`].
    pub async fn profile(&self, session_id: Option<&SessionId>) -> Result<Identity, AuthError> {
        let session = self.session(session_id).await?;

        match self.provider.fetch_identity(&session.access_token).await {
            Ok(identity) => Ok(identity),
            Err(e @ (Error::Unauthorized | Error::ProviderRejected { .. })) => {
                tracing::info!(error = %e, "Session token no longer accepted; ending session");
                if let Some(id) = session_id {
                    self.sessions.destroy(id).await?;
                }
                Err(AuthError::Unauthenticated)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Identity refresh failed");
                Err(AuthError::Unauthenticated)
            }
        }
    }

    /// End the session, if any. Never fails: the caller clears the cookie regardless.
    pub async fn logout(&self, session_id: Option<&SessionId>) {
        if let Some(id) = session_id {
            if let Err(e) = self.sessions.destroy(id).await {
                tracing::warn!(error = %e, "Session deletion failed during logout");
            }
        }
    }

    async fn ensure_user(&self, identity: &Identity) -> Result<UserRecord, AuthError> {
        let email = Email::new(&identity.email);

        if let Some(existing) = self.users.find_by_email(&email).await? {
            return Ok(existing);
        }

        let candidate = UserRecord {
            username: identity.principal_name.clone(),
            email,
            display_name: identity.display_name.clone(),
        };
        self.users.upsert_if_absent(candidate).await.map_err(|e| {
            tracing::error!(error = %e, "User upsert failed");
            AuthError::from(e)
        })
    }
}
