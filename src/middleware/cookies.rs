use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::types::SessionId;

const STATE_COOKIE_NAME: &str = "__authflow_state";

/// Create the state cookie for the authorization request.
///
/// Scoped to the callback path and short-lived: it only has to survive one
/// round trip through the provider.
pub(super) fn state_cookie(state: &str, secure: bool, callback_path: &str) -> Cookie<'static> {
    Cookie::build((STATE_COOKIE_NAME, state.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(callback_path.to_string())
        .max_age(Duration::minutes(5))
        .build()
}

/// Removal cookie for the state cookie.
pub(super) fn clear_state_cookie(callback_path: &str) -> Cookie<'static> {
    Cookie::build(STATE_COOKIE_NAME)
        .path(callback_path.to_string())
        .build()
}

/// Create session cookie.
pub(super) fn session_cookie(
    name: &str,
    session_id: &SessionId,
    ttl: Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name.to_string(), session_id.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(ttl)
        .build()
}

/// Removal cookie for the session.
pub(super) fn clear_session_cookie(name: &str) -> Cookie<'static> {
    Cookie::build(name.to_string()).path("/".to_string()).build()
}

/// Get the state issued at login.
pub(super) fn get_state(jar: &PrivateCookieJar) -> Option<String> {
    jar.get(STATE_COOKIE_NAME).map(|c| c.value().to_string())
}

/// Get the session identifier, `None` if absent or malformed.
pub(super) fn get_session_id(jar: &PrivateCookieJar, name: &str) -> Option<SessionId> {
    jar.get(name).and_then(|c| SessionId::parse(c.value()))
}
