use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const DEFAULT_USERINFO_URL: &str = "https://graph.microsoft.com/v1.0/me";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity provider `OAuth2` configuration.
///
/// Required fields are constructor parameters; there are no runtime "missing field" errors.
///
/// ```rust,ignore
/// use authflow::ProviderConfig;
///
/// let config = ProviderConfig::new("client-id", "client-secret", "my-tenant")?;
/// // Optional overrides via chaining:
/// let config = config.with_userinfo_url("https://graph.example.com/me".parse()?);
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct ProviderConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) userinfo_url: Url,
    pub(crate) timeout: Duration,
}

impl ProviderConfig {
    /// Create a configuration for one tenant of the Microsoft identity platform.
    ///
    /// # Errors
    ///
    /// Returns [`url::ParseError`] if `tenant` does not form a valid endpoint URL.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant: &str,
    ) -> Result<Self, url::ParseError> {
        let authority: Url = DEFAULT_AUTHORITY_HOST.parse()?;
        Ok(Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: authority.join(&format!("{tenant}/oauth2/v2.0/authorize"))?,
            token_url: authority.join(&format!("{tenant}/oauth2/v2.0/token"))?,
            userinfo_url: DEFAULT_USERINFO_URL.parse()?,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Re-root the authorization and token endpoints on another authority host.
    ///
    /// # Errors
    ///
    /// Returns [`url::ParseError`] if the resulting endpoint URLs are invalid.
    pub fn with_authority_host(mut self, host: &Url, tenant: &str) -> Result<Self, url::ParseError> {
        self.auth_url = host.join(&format!("{tenant}/oauth2/v2.0/authorize"))?;
        self.token_url = host.join(&format!("{tenant}/oauth2/v2.0/token"))?;
        Ok(self)
    }

    /// Override the authorization endpoint.
    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    /// Override the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    /// Override the identity (user info) endpoint.
    #[must_use]
    pub fn with_userinfo_url(mut self, url: Url) -> Self {
        self.userinfo_url = url;
        self
    }

    /// Bound every provider round trip (default: 10 seconds).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn userinfo_url(&self) -> &Url {
        &self.userinfo_url
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("userinfo_url", &self.userinfo_url.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Successful token endpoint response.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Error payload from the token endpoint (RFC 6749 §5.2).
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct ProviderErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Body of a token endpoint response: either a grant or an error payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TokenResult {
    Granted(TokenGrant),
    Error(ProviderErrorBody),
}

impl TokenResult {
    /// Collapse into the grant, turning an error payload into [`Error::ProviderRejected`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProviderRejected`] for the `Error` variant.
    pub fn into_grant(self) -> Result<TokenGrant, Error> {
        match self {
            Self::Granted(grant) => Ok(grant),
            Self::Error(body) => Err(Error::ProviderRejected {
                operation: "token exchange",
                code: body.error,
                description: body.error_description.unwrap_or_default(),
            }),
        }
    }
}

/// Authenticated identity as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub email: String,
    pub display_name: String,
    pub principal_name: String,
}

/// Wire shape of the identity endpoint (Microsoft Graph `/me`, or OIDC userinfo).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityResponse {
    #[serde(default, alias = "email")]
    mail: Option<String>,
    #[serde(default, alias = "name")]
    display_name: Option<String>,
    #[serde(alias = "preferred_username")]
    user_principal_name: String,
}

impl From<IdentityResponse> for Identity {
    fn from(r: IdentityResponse) -> Self {
        Self {
            email: r
                .mail
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| r.user_principal_name.clone()),
            display_name: r
                .display_name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| r.user_principal_name.clone()),
            principal_name: r.user_principal_name,
        }
    }
}

/// The authorization-code protocol against one configured provider.
///
/// [`ProviderClient`] is the HTTP implementation; the flow is generic over this
/// trait so it can run against any provider speaking the same protocol.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Build the authorization endpoint URL. No side effects, no network call.
    fn build_authorization_url(&self, scopes: &[String], redirect_uri: &Url, state: &str) -> Url;

    /// Exchange a one-time authorization code for an access token.
    ///
    /// Implementations must not retry: a code is consumed by the first attempt.
    fn exchange_code_for_token(
        &self,
        code: &str,
        redirect_uri: &Url,
        scopes: &[String],
    ) -> impl Future<Output = Result<TokenGrant, Error>> + Send;

    /// Fetch the identity behind an access token.
    fn fetch_identity(&self, access_token: &str) -> impl Future<Output = Result<Identity, Error>> + Send;
}

/// `OAuth2` authorization-code client for one identity provider.
pub struct ProviderClient {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl ProviderClient {
    /// Create a client whose requests are bounded by the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the HTTP client cannot be initialized.
    pub fn new(config: ProviderConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { config, http })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

impl IdentityProvider for ProviderClient {
    fn build_authorization_url(&self, scopes: &[String], redirect_uri: &Url, state: &str) -> Url {
        let scope = scopes.join(" ");

        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("response_mode", "query")
            .append_pair("scope", &scope)
            .append_pair("state", state);
        url
    }

    async fn exchange_code_for_token(
        &self,
        code: &str,
        redirect_uri: &Url,
        scopes: &[String],
    ) -> Result<TokenGrant, Error> {
        let scope = scopes.join(" ");
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<TokenResult>(&body) {
            Ok(result @ TokenResult::Error(_)) => result.into_grant(),
            Ok(TokenResult::Granted(grant)) if status.is_success() => Ok(grant),
            _ => Err(Error::ProviderRejected {
                operation: "token exchange",
                code: status.as_u16().to_string(),
                description: body,
            }),
        }
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<Identity, Error> {
        let response = self
            .http
            .get(self.config.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Unauthorized),
            status if status.is_success() => {
                let identity = response.json::<IdentityResponse>().await?;
                Ok(identity.into())
            }
            status => Err(Error::ProviderRejected {
                operation: "identity request",
                code: status.as_u16().to_string(),
                description: response.text().await.unwrap_or_default(),
            }),
        }
    }
}
