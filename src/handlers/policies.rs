//! RLS administration surface (spec §4.4, §6).

use crate::error::AppResult;
use crate::rls::{self, AuthContext, Policy};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

pub async fn list_policies(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> AppResult<Json<Vec<Policy>>> {
    Ok(Json(rls::list_policies(&state.db, &table).await?))
}

pub async fn enable_rls(State(state): State<AppState>, Path(table): Path<String>) -> AppResult<StatusCode> {
    rls::enable_rls(&state.db, &table).await?;
    Ok(StatusCode::OK)
}

pub async fn disable_rls(State(state): State<AppState>, Path(table): Path<String>) -> AppResult<StatusCode> {
    rls::disable_rls(&state.db, &table).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct UpsertPolicyRequest {
    pub policy_name: String,
    pub command: String,
    pub using_expr: Option<String>,
    pub check_expr: Option<String>,
}

pub async fn create_policy(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(body): Json<UpsertPolicyRequest>,
) -> AppResult<StatusCode> {
    rls::create_policy(
        &state.db,
        &table,
        &body.policy_name,
        &body.command,
        body.using_expr.as_deref(),
        body.check_expr.as_deref(),
    )
    .await?;
    Ok(StatusCode::CREATED)
}

pub async fn update_policy(
    State(state): State<AppState>,
    Path((table, policy_name)): Path<(String, String)>,
    Json(body): Json<UpsertPolicyRequest>,
) -> AppResult<StatusCode> {
    rls::update_policy(
        &state.db,
        &table,
        &policy_name,
        &body.command,
        body.using_expr.as_deref(),
        body.check_expr.as_deref(),
    )
    .await?;
    Ok(StatusCode::OK)
}

pub async fn drop_policy(
    State(state): State<AppState>,
    Path((table, policy_name)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    rls::drop_policy(&state.db, &table, &policy_name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct TestPolicyRequest {
    pub table: String,
    pub using_expr: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TestPolicyResponse {
    pub success: bool,
    pub row_count: Option<i64>,
    pub error: Option<String>,
    pub executed_sql: String,
}

/// Dry-run a candidate policy expression without writing it (spec §8
/// scenario 4 — the dashboard's policy tester). Always responds 200;
/// engine failures surface as `{success: false, error: ...}` rather than
/// an HTTP error, matching the test harness's contract (spec §4.4).
///
/// Per spec §4.4's `auth.*()` substitution table: a present `user_id`
/// evaluates as `authenticated`, an absent one as `anon` with `NULL`
/// `auth.uid()`/`auth.email()`.
pub async fn test_policy(
    State(state): State<AppState>,
    Json(body): Json<TestPolicyRequest>,
) -> Json<TestPolicyResponse> {
    let ctx = if body.user_id.is_some() {
        AuthContext { uid: body.user_id, role: Some("authenticated".to_string()), email: body.email }
    } else {
        AuthContext::default()
    };
    let outcome = rls::test_policy(&state.db, &body.table, &body.using_expr, &ctx).await;
    Json(TestPolicyResponse {
        success: outcome.success,
        row_count: outcome.row_count,
        error: outcome.error,
        executed_sql: outcome.executed_sql,
    })
}
