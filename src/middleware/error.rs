use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::routes::found;

/// Outcomes of the authentication flow that end a request early.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No live, token-bearing session. Answered with a redirect to login.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The provider reported an error on the callback (user cancelled, consent denied, ...).
    #[error("Error: {0}")]
    ProviderRejected(String),

    /// The callback's `state` does not match the one issued at login.
    #[error("Invalid authorization state")]
    StateMismatch,

    /// Code exchange or identity fetch failed.
    #[error("Could not authenticate")]
    AuthenticationFailed,

    /// Session or user storage failed.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => found("/login"),
            Self::ProviderRejected(_) | Self::StateMismatch => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            Self::AuthenticationFailed => {
                (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
            }
            Self::StorageUnavailable(_) | Self::Config(_) => {
                tracing::error!(error = %self, "Auth internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

impl From<crate::error::Error> for AuthError {
    fn from(e: crate::error::Error) -> Self {
        match e {
            crate::error::Error::StorageUnavailable(msg) => Self::StorageUnavailable(msg),
            _ => Self::AuthenticationFailed,
        }
    }
}
