/// Errors from the identity provider client and the storage backends.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The provider answered with an error payload or a non-success status.
    #[error("{operation} rejected by provider: {code}: {description}")]
    ProviderRejected {
        operation: &'static str,
        code: String,
        description: String,
    },

    /// The provider refused the bearer credential.
    #[error("Access token rejected by provider")]
    Unauthorized,

    /// Transport failure, including timeouts.
    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),

    /// Session or user storage could not be reached.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Self::StorageUnavailable(e.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::migrate::MigrateError> for Error {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::StorageUnavailable(e.to_string())
    }
}
