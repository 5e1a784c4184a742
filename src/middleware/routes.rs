use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header::LOCATION};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum_extra::extract::PrivateCookieJar;
use html_escape::encode_text;

use super::config::AuthConfig;
use super::cookies;
use super::flow::{AuthFlow, CallbackParams};
use super::state::AuthState;
use crate::oauth::Identity;
use crate::store::{SessionStore, UserRepository};

/// Create the authentication router.
///
/// Mounts `/`, `/login`, the callback (path of the configured redirect URI),
/// `/profile` and `/logout`.
pub fn auth_routes<U, S>(config: AuthConfig, users: U, sessions: S) -> Router
where
    U: UserRepository,
    S: SessionStore,
{
    let settings = config.settings;
    let flow = AuthFlow::new(
        config.client,
        users,
        sessions,
        settings.redirect_uri.clone(),
        settings.scopes.clone(),
        settings.session_ttl,
    );
    let callback_path = settings.callback_path().to_string();

    let state = AuthState {
        flow: Arc::new(flow),
        settings,
    };

    Router::new()
        .route("/", get(home))
        .route("/login", get(login::<U, S>))
        .route(&callback_path, get(callback::<U, S>))
        .route("/profile", get(profile::<U, S>))
        .route("/logout", get(logout::<U, S>).post(logout::<U, S>))
        .with_state(state)
}

// ── Home ───────────────────────────────────────────────────────────

async fn home() -> Html<&'static str> {
    Html(r#"Welcome to the Home Page! <a href="/login">Login</a>"#)
}

// ── Login ──────────────────────────────────────────────────────────

async fn login<U: UserRepository, S: SessionStore>(
    State(state): State<AuthState<U, S>>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Response) {
    let request = state.flow.login();

    let state_cookie = cookies::state_cookie(
        &request.state,
        state.settings.secure_cookies,
        state.settings.callback_path(),
    );

    (jar.add(state_cookie), found(request.url.as_str()))
}

// ── Callback ───────────────────────────────────────────────────────

async fn callback<U: UserRepository, S: SessionStore>(
    State(state): State<AuthState<U, S>>,
    jar: PrivateCookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let expected_state = cookies::get_state(&jar);
    let current = cookies::get_session_id(&jar, &state.settings.session_cookie_name);
    // The state is single-use whatever the outcome.
    let jar = jar.remove(cookies::clear_state_cookie(state.settings.callback_path()));

    match state
        .flow
        .callback(&params, expected_state.as_deref(), current.as_ref())
        .await
    {
        Ok(session_id) => {
            let session_cookie = cookies::session_cookie(
                &state.settings.session_cookie_name,
                &session_id,
                state.settings.session_ttl,
                state.settings.secure_cookies,
            );
            (jar.add(session_cookie), found(&state.settings.login_redirect)).into_response()
        }
        Err(e) => (jar, e).into_response(),
    }
}

// ── Profile ────────────────────────────────────────────────────────

async fn profile<U: UserRepository, S: SessionStore>(
    State(state): State<AuthState<U, S>>,
    jar: PrivateCookieJar,
) -> Response {
    let session_id = cookies::get_session_id(&jar, &state.settings.session_cookie_name);

    match state.flow.profile(session_id.as_ref()).await {
        Ok(identity) => Html(render_profile(&identity)).into_response(),
        Err(e) => e.into_response(),
    }
}

fn render_profile(identity: &Identity) -> String {
    format!(
        "<h1>Profile</h1>\
         <dl>\
         <dt>Name</dt><dd>{}</dd>\
         <dt>Email</dt><dd>{}</dd>\
         <dt>Principal</dt><dd>{}</dd>\
         </dl>\
         <a href=\"/logout\">Logout</a>",
        encode_text(&identity.display_name),
        encode_text(&identity.email),
        encode_text(&identity.principal_name),
    )
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<U: UserRepository, S: SessionStore>(
    State(state): State<AuthState<U, S>>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Response) {
    let session_id = cookies::get_session_id(&jar, &state.settings.session_cookie_name);
    state.flow.logout(session_id.as_ref()).await;

    let clear_cookie = cookies::clear_session_cookie(&state.settings.session_cookie_name);
    (jar.remove(clear_cookie), found(&state.settings.logout_redirect))
}

// ── Helpers ────────────────────────────────────────────────────────

/// `302 Found` to `location`.
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}
