//! Dashboard user administration: list/delete users and invite new ones
//! (spec §4.5 component H).

use crate::auth::users;
use crate::error::AppResult;
use crate::handlers::auth::TokenResponse;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<users::User>>> {
    Ok(Json(users::list_users(&state.db).await?))
}

pub async fn delete_user(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<StatusCode> {
    users::delete_user(&state.db, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct BatchDeleteRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchDeleteItemResult {
    pub id: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchDeleteResponse {
    pub results: Vec<BatchDeleteItemResult>,
}

/// Delete several users by id in one request, reporting a per-item result
/// rather than failing the whole batch on the first miss (spec §7 "Partial
/// success — multi-object delete returns 207 with a per-item result array").
pub async fn batch_delete_users(
    State(state): State<AppState>,
    Json(body): Json<BatchDeleteRequest>,
) -> (StatusCode, Json<BatchDeleteResponse>) {
    let mut results = Vec::with_capacity(body.ids.len());
    for id in body.ids {
        let result = users::delete_user(&state.db, &id).await;
        results.push(BatchDeleteItemResult {
            id,
            success: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        });
    }
    (StatusCode::MULTI_STATUS, Json(BatchDeleteResponse { results }))
}

#[derive(Debug, Deserialize)]
pub struct InviteUserRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct InviteUserResponse {
    pub user_id: String,
    pub token: String,
}

/// Create a passwordless user and issue a 7-day invite token. Delivering
/// the token to the invitee is out of scope (spec §1's SMTP non-goal);
/// the dashboard operator relays it themselves.
pub async fn invite_user(
    State(state): State<AppState>,
    Json(body): Json<InviteUserRequest>,
) -> AppResult<Json<InviteUserResponse>> {
    let (user, token) = users::invite_user(&state.db, &body.email).await?;
    Ok(Json(InviteUserResponse { user_id: user.id, token }))
}

#[derive(Debug, Deserialize)]
pub struct AcceptInviteRequest {
    pub token: String,
    pub password: String,
}

/// Redeem an invite token, setting the invitee's password and issuing a
/// bearer JWT in the same shape as `/auth/token`.
pub async fn accept_invite(
    State(state): State<AppState>,
    Json(body): Json<AcceptInviteRequest>,
) -> AppResult<Json<TokenResponse>> {
    let user = users::accept_invite(&state.db, &body.token, &body.password, state.config.password.bcrypt_cost).await?;
    let token = crate::auth::jwt::issue_token(
        &state.config.auth.jwt_secret,
        &user.id,
        "authenticated",
        user.email.as_deref(),
        state.config.session.ttl_seconds,
    )?;
    Ok(Json(TokenResponse { access_token: token, user_id: user.id }))
}
