#![doc = include_str!("../README.md")]

pub mod csrf;
pub mod error;
pub mod middleware;
pub mod oauth;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use error::Error;
pub use middleware::{AuthConfig, AuthError, AuthFlow, CallbackParams, auth_routes};
pub use oauth::{
    Identity, IdentityProvider, ProviderClient, ProviderConfig, TokenGrant, TokenResult,
};
pub use store::{SessionStore, UserRepository};
pub use types::{Email, SessionData, SessionId, UserRecord};
