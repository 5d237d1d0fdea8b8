//! Session-cookie gate for the dashboard API (spec §4.5, §6): every
//! `/_/api/*` route except `auth/login` and `health` requires a live
//! session. The cookie name is port-scoped (`_sblite_session_<port>`)
//! so two instances on the same host never collide.

use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};

fn parse_cookie(header_value: &str, name: &str) -> Option<String> {
    header_value.split(';').find_map(|kv| {
        let mut parts = kv.trim().splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        (key == name).then(|| value.to_string())
    })
}

/// Reject the request unless its session cookie resolves to a live,
/// unexpired session. On success, the resolved operator id is inserted
/// into the request extensions for downstream handlers.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let cookie_name = state.config.session_cookie_name();
    let token = request
        .headers()
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| parse_cookie(value, &cookie_name));

    let Some(token) = token else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    let Some(session) = state.sessions.get(&token) else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}
