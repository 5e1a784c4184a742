//! End-to-end tests of the HTTP surface against a mock identity provider.

#![cfg(feature = "sqlite")]

use std::time::Duration;

use authflow::middleware::{AuthConfig, CookieKey, auth_routes};
use authflow::store::sqlite::{self, SqliteSessionStore, SqliteUserRepository};
use authflow::{
    Email, Error, ProviderClient, ProviderConfig, SessionData, SessionId, SessionStore,
    UserRepository,
};
use axum::Router;
use axum::body::Body;
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::json;
use sqlx::SqlitePool;
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SESSION_COOKIE: &str = "__authflow_session";
const STATE_COOKIE: &str = "__authflow_state";

struct TestApp {
    router: Router,
    pool: SqlitePool,
    provider: MockServer,
}

async fn mount_provider(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/tenant/oauth2/v2.0/token"))
        .and(body_string_contains("code=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "tok1"
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/tenant/oauth2/v2.0/token"))
        .and(body_string_contains("code=expired"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "AADSTS70008: The provided authorization code has expired."
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/tenant/oauth2/v2.0/token"))
        .and(body_string_contains("code=slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "tok-slow" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(server)
        .await;

    // `tok2` is accepted once (at login) and revoked afterwards.
    Mock::given(method("POST"))
        .and(path("/tenant/oauth2/v2.0/token"))
        .and(body_string_contains("code=revocable"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "tok2" })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer tok2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mail": "b@x.com",
            "displayName": "B",
            "userPrincipalName": "b@x.com"
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer tok2"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": "InvalidAuthenticationToken" }
        })))
        .mount(server)
        .await;

    // `tok3` answers once, then the identity endpoint stops responding in time.
    Mock::given(method("POST"))
        .and(path("/tenant/oauth2/v2.0/token"))
        .and(body_string_contains("code=flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "tok3" })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer tok3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mail": "c@x.com",
            "displayName": "C",
            "userPrincipalName": "c@x.com"
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer tok3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "userPrincipalName": "c@x.com" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mail": "a@x.com",
            "displayName": "A",
            "userPrincipalName": "a@x.com"
        })))
        .mount(server)
        .await;
}

fn config_for(provider: &MockServer) -> AuthConfig {
    let host: Url = provider.uri().parse().unwrap();
    let provider_config = ProviderConfig::new("test-client", "test-secret", "tenant")
        .unwrap()
        .with_authority_host(&host, "tenant")
        .unwrap()
        .with_userinfo_url(format!("{}/me", provider.uri()).parse().unwrap())
        .with_timeout(Duration::from_millis(500));

    AuthConfig::new(
        ProviderClient::new(provider_config).unwrap(),
        "http://localhost:5000/getAToken".parse().unwrap(),
    )
    .unwrap()
    .with_cookie_key(CookieKey::generate())
    .with_secure_cookies(false)
}

async fn setup() -> TestApp {
    setup_with(|pool| SqliteSessionStore::new(pool.clone())).await
}

async fn setup_with<S: SessionStore>(sessions: impl FnOnce(&SqlitePool) -> S) -> TestApp {
    let provider = MockServer::start().await;
    mount_provider(&provider).await;

    let pool = sqlite::connect_in_memory().await.unwrap();
    let router = auth_routes(
        config_for(&provider),
        SqliteUserRepository::new(pool.clone()),
        sessions(&pool),
    );

    TestApp {
        router,
        pool,
        provider,
    }
}

/// Session store whose backend is unreachable.
struct UnreachableSessions;

impl SessionStore for UnreachableSessions {
    async fn create(&self, _data: SessionData) -> Result<SessionId, Error> {
        Err(Error::StorageUnavailable("connection refused".into()))
    }

    async fn get(&self, _id: &SessionId) -> Result<Option<SessionData>, Error> {
        Err(Error::StorageUnavailable("connection refused".into()))
    }

    async fn destroy(&self, _id: &SessionId) -> Result<(), Error> {
        Err(Error::StorageUnavailable("connection refused".into()))
    }

    async fn purge_expired(&self) -> Result<usize, Error> {
        Ok(0)
    }
}

impl TestApp {
    async fn get(&self, uri: &str, cookies: &[&str]) -> Response {
        let mut request = Request::builder().uri(uri);
        if !cookies.is_empty() {
            request = request.header(COOKIE, cookies.join("; "));
        }
        self.router
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    /// Runs `/login`; returns the state sent to the provider and the state cookie.
    async fn start_login(&self) -> (String, String) {
        let response = self.get("/login", &[]).await;
        assert_eq!(response.status(), StatusCode::FOUND);

        let location: Url = location(&response).parse().unwrap();
        assert_eq!(location.path(), "/tenant/oauth2/v2.0/authorize");
        let state = location
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .expect("state parameter");

        let cookie = set_cookie(&response, STATE_COOKIE).expect("state cookie");
        (state, cookie)
    }

    /// Full login with `code`; returns the callback response.
    async fn complete_login(&self, code: &str, cookies: &[&str]) -> Response {
        let (state, state_cookie) = self.start_login().await;
        let mut all = vec![state_cookie.as_str()];
        all.extend_from_slice(cookies);
        self.get(&format!("/getAToken?code={code}&state={state}"), &all)
            .await
    }

    async fn count(&self, table: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .unwrap();
        n
    }

    async fn token_requests(&self) -> usize {
        self.provider
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path().ends_with("/token"))
            .count()
    }
}

fn location(response: &Response) -> &str {
    response.headers()[LOCATION].to_str().unwrap()
}

/// `name=value` of the first Set-Cookie for `name` that carries a value.
fn set_cookie(response: &Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&prefix) && pair.len() > prefix.len())
        .map(str::to_string)
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn home_links_to_login() {
    let app = setup().await;
    let response = app.get("/", &[]).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains(r#"href="/login""#));
}

#[tokio::test]
async fn login_redirects_with_client_identity() {
    let app = setup().await;
    let response = app.get("/login", &[]).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    let url: Url = location(&response).parse().unwrap();
    let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(query["client_id"], "test-client");
    assert_eq!(query["response_type"], "code");
    assert_eq!(query["redirect_uri"], "http://localhost:5000/getAToken");
    assert_eq!(query["scope"], "User.Read");
}

#[tokio::test]
async fn successful_login_creates_user_and_session() {
    let app = setup().await;
    let (state, state_cookie) = app.start_login().await;

    let response = app
        .get(&format!("/getAToken?code=abc123&state={state}"), &[&state_cookie])
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/profile");
    let session_cookie = set_cookie(&response, SESSION_COOKIE).expect("session cookie");
    let raw = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(SESSION_COOKIE))
        .unwrap()
        .to_string();
    assert!(raw.contains("HttpOnly"));

    let users = SqliteUserRepository::new(app.pool.clone());
    let user = users
        .find_by_email(&Email::new("a@x.com"))
        .await
        .unwrap()
        .expect("user created");
    assert_eq!(user.username, "a@x.com");
    assert_eq!(user.display_name, "A");
    assert_eq!(app.count("sessions").await, 1);

    let profile = app.get("/profile", &[&session_cookie]).await;
    assert_eq!(profile.status(), StatusCode::OK);
    let html = body_text(profile).await;
    assert!(html.contains("a@x.com"));
    assert!(html.contains("<dd>A</dd>"));
}

#[tokio::test]
async fn provider_error_is_400_without_writes() {
    let app = setup().await;
    let (_, state_cookie) = app.start_login().await;

    let response = app
        .get(
            "/getAToken?error=access_denied&error_description=User+cancelled",
            &[&state_cookie],
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(set_cookie(&response, SESSION_COOKIE).is_none());
    assert!(body_text(response).await.contains("User cancelled"));
    assert_eq!(app.count("sessions").await, 0);
    assert_eq!(app.count("users").await, 0);
    assert_eq!(app.token_requests().await, 0);
}

#[tokio::test]
async fn expired_code_is_401() {
    let app = setup().await;
    let (state, state_cookie) = app.start_login().await;

    let response = app
        .get(&format!("/getAToken?code=expired&state={state}"), &[&state_cookie])
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(&response, SESSION_COOKIE).is_none());
    assert_eq!(body_text(response).await, "Could not authenticate");
    assert_eq!(app.count("sessions").await, 0);
    assert_eq!(app.count("users").await, 0);
}

#[tokio::test]
async fn slow_provider_times_out_as_401() {
    let app = setup().await;
    let (state, state_cookie) = app.start_login().await;

    let response = app
        .get(&format!("/getAToken?code=slow&state={state}"), &[&state_cookie])
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.count("sessions").await, 0);
}

#[tokio::test]
async fn callback_without_state_cookie_is_rejected() {
    let app = setup().await;

    let response = app.get("/getAToken?code=abc123&state=forged", &[]).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.token_requests().await, 0);
    assert_eq!(app.count("sessions").await, 0);
}

#[tokio::test]
async fn callback_with_foreign_state_is_rejected() {
    let app = setup().await;
    let (_, state_cookie) = app.start_login().await;

    let response = app
        .get("/getAToken?code=abc123&state=not-the-issued-state", &[&state_cookie])
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.token_requests().await, 0);
}

#[tokio::test]
async fn profile_without_session_redirects_to_login() {
    let app = setup().await;

    let response = app.get("/profile", &[]).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login");

    let response = app
        .get("/profile", &[&format!("{SESSION_COOKIE}=tampered-value")])
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn logout_then_profile_redirects_to_login() {
    let app = setup().await;
    let (state, state_cookie) = app.start_login().await;
    let response = app
        .get(&format!("/getAToken?code=abc123&state={state}"), &[&state_cookie])
        .await;
    let session_cookie = set_cookie(&response, SESSION_COOKIE).unwrap();

    let response = app.get("/logout", &[&session_cookie]).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/");
    assert_eq!(app.count("sessions").await, 0);

    // A replayed cookie no longer maps to a session.
    let response = app.get("/profile", &[&session_cookie]).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn logout_without_session_still_redirects_home() {
    let app = setup().await;
    let response = app.get("/logout", &[]).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn second_login_reuses_user_record() {
    let app = setup().await;
    for _ in 0..2 {
        let (state, state_cookie) = app.start_login().await;
        let response = app
            .get(&format!("/getAToken?code=abc123&state={state}"), &[&state_cookie])
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
    }

    assert_eq!(app.count("users").await, 1);
    assert_eq!(app.count("sessions").await, 2);
}

#[tokio::test]
async fn relogin_replaces_existing_session() {
    let app = setup().await;
    let response = app.complete_login("abc123", &[]).await;
    let first = set_cookie(&response, SESSION_COOKIE).unwrap();

    let response = app.complete_login("abc123", &[&first]).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let second = set_cookie(&response, SESSION_COOKIE).unwrap();

    assert_ne!(first, second);
    assert_eq!(app.count("sessions").await, 1);
    let stale = app.get("/profile", &[&first]).await;
    assert_eq!(location(&stale), "/login");
}

#[tokio::test]
async fn session_storage_failure_is_500_without_user() {
    let app = setup_with(|_| UnreachableSessions).await;

    let response = app.complete_login("abc123", &[]).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(set_cookie(&response, SESSION_COOKIE).is_none());
    assert_eq!(body_text(response).await, "Internal error");
    assert_eq!(app.count("users").await, 0);
}

#[tokio::test]
async fn revoked_token_on_profile_ends_session() {
    let app = setup().await;
    let response = app.complete_login("revocable", &[]).await;
    assert_eq!(location(&response), "/profile");
    let session_cookie = set_cookie(&response, SESSION_COOKIE).unwrap();
    assert_eq!(app.count("sessions").await, 1);

    let response = app.get("/profile", &[&session_cookie]).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login");
    assert_eq!(app.count("sessions").await, 0);
}

#[tokio::test]
async fn identity_timeout_on_profile_keeps_session() {
    let app = setup().await;
    let response = app.complete_login("flaky", &[]).await;
    assert_eq!(location(&response), "/profile");
    let session_cookie = set_cookie(&response, SESSION_COOKIE).unwrap();

    let response = app.get("/profile", &[&session_cookie]).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login");
    assert_eq!(app.count("sessions").await, 1);
}
