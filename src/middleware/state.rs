use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use super::config::AuthSettings;
use super::flow::AuthFlow;
use crate::oauth::ProviderClient;
use crate::store::{SessionStore, UserRepository};

/// Shared state for auth route handlers.
pub(super) struct AuthState<U, S> {
    pub(super) flow: Arc<AuthFlow<ProviderClient, U, S>>,
    pub(super) settings: AuthSettings,
}

// Manual Clone: avoid derive adding `U: Clone, S: Clone` bounds.
impl<U, S> Clone for AuthState<U, S> {
    fn clone(&self) -> Self {
        Self {
            flow: Arc::clone(&self.flow),
            settings: self.settings.clone(),
        }
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl<U: UserRepository, S: SessionStore> FromRef<AuthState<U, S>> for Key {
    fn from_ref(state: &AuthState<U, S>) -> Self {
        state.settings.cookie_key.clone()
    }
}
