//! Plug-and-play `OAuth2` login for Axum.
//!
//! Wires [`AuthFlow`] (the login state machine) to HTTP: redirects, the
//! provider callback, encrypted cookies for the state token and the session
//! identifier, and the mapping of [`AuthError`] to responses.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use authflow::middleware::{AuthConfig, auth_routes};
//! use authflow::store::{MemorySessionStore, MemoryUserRepository};
//!
//! let config = AuthConfig::from_env()?;
//! let app = axum::Router::new()
//!     .merge(auth_routes(config, MemoryUserRepository::new(), MemorySessionStore::new()));
//! ```

mod config;
mod cookies;
mod error;
pub mod flow;
mod routes;
mod state;

pub use config::AuthConfig;
pub use error::AuthError;
pub use flow::{AuthFlow, CallbackParams, LoginRedirect};
pub use routes::auth_routes;

/// Re-export cookie key type for builder API.
pub use axum_extra::extract::cookie::Key as CookieKey;
