//! Dashboard operator auth and API-client signup/token issuance (spec §4.5, §6).

use crate::auth::{password, users};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::Row;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub needs_setup: bool,
    pub authenticated: bool,
}

fn session_token_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.split(';').find_map(|kv| {
                let mut parts = kv.trim().splitn(2, '=');
                let key = parts.next()?.trim();
                let value = parts.next()?.trim();
                (key == cookie_name).then(|| value.to_string())
            })
        })
}

/// Whether dashboard setup has run, and whether the caller holds a live
/// session (spec §8 scenario 1).
pub async fn status(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<StatusResponse>> {
    let needs_setup = sqlx::query("SELECT 1 FROM _dashboard WHERE key = 'operator_password_hash'")
        .fetch_optional(state.db.pool())
        .await?
        .is_none();
    let authenticated = session_token_from_headers(&headers, &state.config.session_cookie_name())
        .is_some_and(|token| state.sessions.get(&token).is_some());
    Ok(Json(StatusResponse { needs_setup, authenticated }))
}

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub password: String,
}

/// Build the `Set-Cookie` header for a freshly minted operator session.
fn session_cookie_headers(state: &AppState, token: &str) -> AppResult<HeaderMap> {
    let cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/_/; Max-Age={}",
        state.config.session_cookie_name(),
        token,
        state.config.session.ttl_seconds
    );
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| AppError::Internal(e.to_string()))?,
    );
    Ok(headers)
}

/// First-boot dashboard setup: set the operator password once and
/// immediately issue a session (spec §4.5 "immediately issue a
/// session"). Fails with `Precondition` if a password has already been
/// set (spec §4.5 "setup already done").
pub async fn setup(
    State(state): State<AppState>,
    Json(body): Json<SetupRequest>,
) -> AppResult<(StatusCode, HeaderMap, Json<LoginResponse>)> {
    let existing = sqlx::query("SELECT value FROM _dashboard WHERE key = 'operator_password_hash'")
        .fetch_optional(state.db.pool())
        .await?;
    if existing.is_some() {
        return Err(AppError::Precondition("dashboard setup has already run".to_string()));
    }
    if body.password.chars().count() < 8 {
        return Err(AppError::Validation("password must be at least 8 characters".to_string()));
    }
    let hashed = password::hash_password(&body.password, state.config.password.bcrypt_cost)?;
    sqlx::query("INSERT INTO _dashboard (key, value) VALUES ('operator_password_hash', ?)")
        .bind(hashed)
        .execute(state.db.pool())
        .await?;

    let token = state.sessions.create("operator", state.config.session.ttl_seconds);
    let headers = session_cookie_headers(&state, &token)?;
    Ok((StatusCode::OK, headers, Json(LoginResponse { ok: true })))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub ok: bool,
}

/// Verify the operator password and mint a session, returned as a
/// `Set-Cookie` header scoped to this instance's port.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let row = sqlx::query("SELECT value FROM _dashboard WHERE key = 'operator_password_hash'")
        .fetch_optional(state.db.pool())
        .await?
        .ok_or_else(|| AppError::Precondition("dashboard has not been set up yet".to_string()))?;
    let hashed: String = row.get("value");
    if !password::verify_password(&body.password, &hashed)? {
        return Err(AppError::Unauthorized("invalid password".to_string()));
    }

    let token = state.sessions.create("operator", state.config.session.ttl_seconds);
    let headers = session_cookie_headers(&state, &token)?;
    Ok((headers, Json(LoginResponse { ok: true })))
}

/// Revoke the caller's dashboard session.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<StatusCode> {
    let cookie_name = state.config.session_cookie_name();
    if let Some(token) = session_token_from_headers(&headers, &cookie_name) {
        state.sessions.revoke(&token);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub user_id: String,
}

/// Register a new API user and issue a bearer JWT.
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> AppResult<Json<TokenResponse>> {
    let user = users::create_user(&state.db, &body.email, &body.password, state.config.password.bcrypt_cost).await?;
    let token = crate::auth::jwt::issue_token(
        &state.config.auth.jwt_secret,
        &user.id,
        "authenticated",
        user.email.as_deref(),
        state.config.session.ttl_seconds,
    )?;
    Ok(Json(TokenResponse { access_token: token, user_id: user.id }))
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

/// Exchange email/password credentials for a bearer JWT.
pub async fn token(
    State(state): State<AppState>,
    Json(body): Json<TokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    let (user, hashed) = users::find_by_email(&state.db, &body.email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("invalid credentials".to_string()))?;
    if !password::verify_password(&body.password, &hashed)? {
        return Err(AppError::Unauthorized("invalid credentials".to_string()));
    }
    let token = crate::auth::jwt::issue_token(
        &state.config.auth.jwt_secret,
        &user.id,
        "authenticated",
        user.email.as_deref(),
        state.config.session.ttl_seconds,
    )?;
    Ok(Json(TokenResponse { access_token: token, user_id: user.id }))
}

/// Issue an anonymous bearer JWT, gated by `auth.allow_anonymous` (spec
/// §4.5). The config value is the instance default at boot; an operator
/// can flip it at runtime via `PUT /_/api/settings/allow_anonymous`
/// (spec §8 "setAllowAnonymous" round-trip), which this checks first.
pub async fn anonymous_token(State(state): State<AppState>) -> AppResult<Json<TokenResponse>> {
    let allowed = match crate::settings::get_setting(&state.db, "allow_anonymous").await? {
        Some(value) => value == "true",
        None => state.config.auth.allow_anonymous,
    };
    if !allowed {
        return Err(AppError::Forbidden("anonymous signup is disabled".to_string()));
    }
    let user = users::create_anonymous_user(&state.db).await?;
    let token = crate::auth::jwt::issue_token(
        &state.config.auth.jwt_secret,
        &user.id,
        "anon",
        None,
        state.config.session.ttl_seconds,
    )?;
    Ok(Json(TokenResponse { access_token: token, user_id: user.id }))
}
