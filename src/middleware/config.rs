use axum_extra::extract::cookie::Key;
use url::Url;

use super::error::AuthError;
use crate::oauth::{ProviderClient, ProviderConfig};

/// Shared auth settings used by both config and runtime state.
#[derive(Clone)]
pub(crate) struct AuthSettings {
    pub(crate) cookie_key: Key,
    pub(crate) session_cookie_name: String,
    pub(crate) session_ttl: time::Duration,
    pub(crate) secure_cookies: bool,
    pub(crate) redirect_uri: Url,
    pub(crate) scopes: Vec<String>,
    pub(crate) login_redirect: String,
    pub(crate) logout_redirect: String,
}

impl AuthSettings {
    fn defaults(redirect_uri: Url) -> Self {
        Self {
            cookie_key: Key::generate(),
            session_cookie_name: "__authflow_session".into(),
            session_ttl: time::Duration::hours(8),
            secure_cookies: true,
            redirect_uri,
            scopes: vec!["User.Read".into()],
            login_redirect: "/profile".into(),
            logout_redirect: "/".into(),
        }
    }

    /// Path component of the redirect URI; the callback route is mounted here.
    pub(crate) fn callback_path(&self) -> &str {
        self.redirect_uri.path()
    }
}

/// Authentication configuration, built once at startup.
///
/// Required fields (`client`, `redirect_uri`) are constructor parameters.
///
/// Use [`from_env()`](AuthConfig::from_env) for convention-based setup,
/// or [`new()`](AuthConfig::new) with `with_*` methods for full control.
pub struct AuthConfig {
    pub(super) client: ProviderClient,
    pub(super) settings: AuthSettings,
}

/// Routes mounted by [`auth_routes`](super::auth_routes) besides the callback.
const RESERVED_PATHS: [&str; 4] = ["/", "/login", "/profile", "/logout"];

/// The callback must get a route of its own, matched literally.
fn check_callback_path(redirect_uri: &Url) -> Result<(), AuthError> {
    let path = redirect_uri.path();
    if RESERVED_PATHS.contains(&path) {
        return Err(AuthError::Config(format!(
            "redirect URI path {path} collides with a built-in route"
        )));
    }
    if path.contains(['{', '}']) {
        return Err(AuthError::Config(format!(
            "redirect URI path {path} must not contain route parameters"
        )));
    }
    Ok(())
}

fn required(name: &str) -> Result<String, AuthError> {
    std::env::var(name).map_err(|_| AuthError::Config(format!("{name} is required")))
}

fn parse_url(name: &str, value: &str) -> Result<Url, AuthError> {
    value
        .parse()
        .map_err(|e| AuthError::Config(format!("{name}: {e}")))
}

impl AuthConfig {
    /// Create config with the required provider client and redirect URI.
    ///
    /// All optional fields use defaults. Override with `with_*` methods.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the redirect URI path is one of the
    /// built-in routes (`/`, `/login`, `/profile`, `/logout`) or contains
    /// route parameter syntax.
    pub fn new(client: ProviderClient, redirect_uri: Url) -> Result<Self, AuthError> {
        check_callback_path(&redirect_uri)?;
        Ok(Self {
            client,
            settings: AuthSettings::defaults(redirect_uri),
        })
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `AZURE_CLIENT_ID`: `OAuth2` client ID
    /// - `AZURE_CLIENT_SECRET`: `OAuth2` client credential
    /// - `AZURE_TENANT_ID`: tenant (issuer) identifier
    /// - `AZURE_REDIRECT_URI`: callback URI registered with the provider
    ///
    /// # Optional env vars
    /// - `AZURE_SCOPES`: Comma-separated scopes (default `User.Read`)
    /// - `AZURE_AUTHORITY_HOST`: Override `https://login.microsoftonline.com`
    /// - `AZURE_USERINFO_URL`: Override the identity endpoint
    /// - `PROVIDER_TIMEOUT_SECS`: Bound on each provider round trip
    /// - `SESSION_SECRET`: Cookie encryption key bytes (at least 64)
    /// - `SESSION_TTL_MINUTES`: Session lifetime
    /// - `DEV_INSECURE_COOKIES`: `"1"` or `"true"` drops the `Secure` cookie flag
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if required env vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        let client_id = required("AZURE_CLIENT_ID")?;
        let client_secret = required("AZURE_CLIENT_SECRET")?;
        let tenant = required("AZURE_TENANT_ID")?;
        let redirect_uri = parse_url("AZURE_REDIRECT_URI", &required("AZURE_REDIRECT_URI")?)?;
        check_callback_path(&redirect_uri)?;

        let mut provider = ProviderConfig::new(client_id, client_secret, &tenant)
            .map_err(|e| AuthError::Config(format!("AZURE_TENANT_ID: {e}")))?;

        if let Ok(host) = std::env::var("AZURE_AUTHORITY_HOST") {
            let host = parse_url("AZURE_AUTHORITY_HOST", &host)?;
            provider = provider
                .with_authority_host(&host, &tenant)
                .map_err(|e| AuthError::Config(format!("AZURE_AUTHORITY_HOST: {e}")))?;
        }
        if let Ok(url) = std::env::var("AZURE_USERINFO_URL") {
            provider = provider.with_userinfo_url(parse_url("AZURE_USERINFO_URL", &url)?);
        }
        if let Ok(secs) = std::env::var("PROVIDER_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| AuthError::Config(format!("PROVIDER_TIMEOUT_SECS: {e}")))?;
            provider = provider.with_timeout(std::time::Duration::from_secs(secs));
        }

        let client = ProviderClient::new(provider)
            .map_err(|e| AuthError::Config(format!("HTTP client: {e}")))?;
        let mut config = Self::new(client, redirect_uri)?;

        if let Ok(scopes) = std::env::var("AZURE_SCOPES") {
            config = config.with_scopes(
                scopes
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }

        if let Ok(minutes) = std::env::var("SESSION_TTL_MINUTES") {
            let minutes: i64 = minutes
                .parse()
                .map_err(|e| AuthError::Config(format!("SESSION_TTL_MINUTES: {e}")))?;
            if minutes <= 0 {
                return Err(AuthError::Config("SESSION_TTL_MINUTES must be positive".into()));
            }
            config = config.with_session_ttl(time::Duration::minutes(minutes));
        }

        let insecure = matches!(
            std::env::var("DEV_INSECURE_COOKIES").as_deref(),
            Ok("1") | Ok("true"),
        );

        let cookie_key = match std::env::var("SESSION_SECRET") {
            Ok(k) => Key::try_from(k.as_bytes()).map_err(|_| {
                AuthError::Config(
                    "SESSION_SECRET is set but invalid (must be at least 64 bytes). \
                     Remove the env var to use an ephemeral key, or provide a valid key."
                        .into(),
                )
            })?,
            Err(_) => {
                tracing::warn!("SESSION_SECRET not set; sessions will not survive a restart");
                Key::generate()
            }
        };

        Ok(config
            .with_cookie_key(cookie_key)
            .with_secure_cookies(!insecure))
    }

    #[must_use]
    pub fn with_cookie_key(mut self, key: Key) -> Self {
        self.settings.cookie_key = key;
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: time::Duration) -> Self {
        self.settings.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    /// Override the requested scopes (default: `["User.Read"]`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.settings.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_login_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.login_redirect = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.logout_redirect = path.into();
        self
    }

    /// Path the callback route is mounted on.
    #[must_use]
    pub fn callback_path(&self) -> &str {
        self.settings.callback_path()
    }
}
