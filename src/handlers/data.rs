//! The generated CRUD surface: `GET/POST/PATCH/DELETE /_/api/data/{table}`
//! (spec §4.3). Every query is filtered through the RLS predicate for the
//! caller's resolved identity before it reaches the client.

use crate::catalog;
use crate::crud::{self, SelectParams};
use crate::db::{bind_json_value, row_to_pairs};
use crate::error::{AppError, AppResult};
use crate::rls::{self, AuthContext, Command};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde_json::Value as JsonValue;
use sqlx::{sqlite::SqliteArguments, Arguments, Row};
use std::collections::HashMap;

/// Resolve the caller's identity from a bearer JWT, defaulting to the
/// anonymous role when no (or an invalid) token is presented — data
/// reads should degrade to "whatever anon policies allow", not a hard
/// 401, since most tables have no RLS enabled at all (spec §4.4, §4.5).
fn auth_context_from_headers(headers: &HeaderMap, jwt_secret: &str) -> AuthContext {
    let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return AuthContext::default();
    };
    crate::auth::jwt::verify_token(jwt_secret, token)
        .map(|claims| AuthContext { uid: Some(claims.sub), role: Some(claims.role), email: claims.email })
        .unwrap_or_default()
}

fn bind_select_value<'a>(args: &mut SqliteArguments<'a>, value: &'a str) {
    args.add(value).ok();
}

pub async fn select(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> AppResult<Json<JsonValue>> {
    catalog::validate_table_name(&table)?;
    let ctx = auth_context_from_headers(&headers, &state.config.auth.jwt_secret);
    let params: SelectParams = crud::parse_select_params(&query)?;
    let predicate = rls::compile_rls_predicate(&state.db, &table, Command::Select, &ctx).await?;

    let (select_sql, count_sql, binds) = crud::build_select(&table, &params);
    let select_sql = inject_predicate(&select_sql, &predicate);
    let count_sql = inject_predicate(&count_sql, &predicate);

    let mut select_query = sqlx::query(&select_sql);
    for b in &binds {
        select_query = select_query.bind(b);
    }
    let rows = select_query.fetch_all(state.db.pool()).await?;
    let data: Vec<JsonValue> = rows
        .iter()
        .map(|row| crud::row_to_json(row_to_pairs(row)))
        .collect();

    let mut count_query = sqlx::query(&count_sql);
    for b in &binds {
        count_query = count_query.bind(b);
    }
    let total: i64 = count_query.fetch_one(state.db.pool()).await?.get("n");

    Ok(Json(serde_json::json!({ "data": data, "total": total })))
}

/// Combine the CRUD generator's `WHERE`/empty fragment with the RLS
/// predicate; the predicate always applies, independent of caller filters.
fn inject_predicate(sql: &str, predicate: &str) -> String {
    if predicate == "1 = 1" {
        return sql.to_string();
    }
    if let Some(pos) = sql.find("WHERE ") {
        let (before, after) = sql.split_at(pos + "WHERE ".len());
        format!("{before}({predicate}) AND {after}")
    } else if let Some(pos) = sql.find(" LIMIT ") {
        let (before, after) = sql.split_at(pos);
        format!("{before} WHERE {predicate}{after}")
    } else {
        format!("{sql} WHERE {predicate}")
    }
}

pub async fn insert(
    State(state): State<AppState>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(values): Json<HashMap<String, JsonValue>>,
) -> AppResult<(StatusCode, Json<JsonValue>)> {
    catalog::validate_table_name(&table)?;
    let ctx = auth_context_from_headers(&headers, &state.config.auth.jwt_secret);
    let predicate = rls::compile_rls_predicate(&state.db, &table, Command::Insert, &ctx).await?;
    if predicate == "0 = 1" {
        return Err(AppError::Unauthorized("insert rejected by row-level security".to_string()));
    }

    let columns = catalog::list_columns(&state.db, &table).await?;
    let defaults: HashMap<String, Option<String>> = columns
        .into_iter()
        .map(|c| (c.column_name, c.default_value))
        .collect();

    let (sql, binds) = crud::build_insert(&table, &values, &defaults)?;
    let mut args = SqliteArguments::default();
    for v in &binds {
        bind_json_value(&mut args, v);
    }
    sqlx::query_with(&sql, args).execute(state.db.pool()).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "inserted": true }))))
}

pub async fn update(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    Json(values): Json<HashMap<String, JsonValue>>,
) -> AppResult<Json<JsonValue>> {
    catalog::validate_table_name(&table)?;
    let ctx = auth_context_from_headers(&headers, &state.config.auth.jwt_secret);
    let predicate = rls::compile_rls_predicate(&state.db, &table, Command::Update, &ctx).await?;

    let params = crud::parse_select_params(&query)?;
    let (sql, binds, where_binds) = crud::build_update(&table, &values, &params.filters)?;
    let sql = inject_predicate(&sql, &predicate);

    let mut args = SqliteArguments::default();
    for v in &binds {
        bind_json_value(&mut args, v);
    }
    for b in &where_binds {
        bind_select_value(&mut args, b);
    }
    let result = sqlx::query_with(&sql, args).execute(state.db.pool()).await?;
    Ok(Json(serde_json::json!({ "updated": result.rows_affected() })))
}

/// Deletes always require at least one filter (spec §4.3) and respond
/// with 204 No Content on success (spec §8 scenario 3), carrying no body.
pub async fn delete(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    catalog::validate_table_name(&table)?;
    let ctx = auth_context_from_headers(&headers, &state.config.auth.jwt_secret);
    let predicate = rls::compile_rls_predicate(&state.db, &table, Command::Delete, &ctx).await?;

    let params = crud::parse_select_params(&query)?;
    let (sql, binds) = crud::build_delete(&table, &params.filters)?;
    let sql = inject_predicate(&sql, &predicate);

    let mut select_query = sqlx::query(&sql);
    for b in &binds {
        select_query = select_query.bind(b);
    }
    select_query.execute(state.db.pool()).await?;
    Ok(StatusCode::NO_CONTENT)
}
