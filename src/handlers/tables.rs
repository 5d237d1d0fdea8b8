//! Table/schema management surface (spec §6): list tables, inspect
//! columns, and run DDL operations through the migration journal.

use crate::catalog;
use crate::ddl::{self, ColumnDef};
use crate::error::AppResult;
use crate::rls;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

pub async fn list_tables(State(state): State<AppState>) -> AppResult<Json<Vec<String>>> {
    Ok(Json(catalog::list_tables(&state.db).await?))
}

pub async fn list_columns(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> AppResult<Json<Vec<catalog::ColumnInfo>>> {
    Ok(Json(catalog::list_columns(&state.db, &table).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateTableRequest {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

pub async fn create_table(
    State(state): State<AppState>,
    Json(body): Json<CreateTableRequest>,
) -> AppResult<axum::http::StatusCode> {
    ddl::create_table(&state.db, &state.config.database.migrations_dir, &body.name, &body.columns).await?;
    Ok(axum::http::StatusCode::CREATED)
}

pub async fn drop_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> AppResult<axum::http::StatusCode> {
    ddl::drop_table(&state.db, &state.config.database.migrations_dir, &table).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AddColumnRequest {
    #[serde(flatten)]
    pub column: ColumnDef,
}

pub async fn add_column(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(body): Json<AddColumnRequest>,
) -> AppResult<axum::http::StatusCode> {
    ddl::add_column(&state.db, &state.config.database.migrations_dir, &table, &body.column).await?;
    Ok(axum::http::StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
pub struct RenameColumnRequest {
    pub from: String,
    pub to: String,
}

pub async fn rename_column(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(body): Json<RenameColumnRequest>,
) -> AppResult<axum::http::StatusCode> {
    ddl::rename_column(&state.db, &state.config.database.migrations_dir, &table, &body.from, &body.to).await?;
    Ok(axum::http::StatusCode::OK)
}

pub async fn drop_column(
    State(state): State<AppState>,
    Path((table, column)): Path<(String, String)>,
) -> AppResult<axum::http::StatusCode> {
    ddl::drop_column(&state.db, &state.config.database.migrations_dir, &table, &column).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct RlsStatus {
    pub enabled: bool,
}

/// `GET /_/api/tables/{name}/rls` — current RLS toggle state (spec §6).
pub async fn get_rls_status(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> AppResult<Json<RlsStatus>> {
    let enabled = rls::is_rls_enabled(&state.db, &table).await?;
    Ok(Json(RlsStatus { enabled }))
}

#[derive(Debug, Deserialize)]
pub struct SetRlsRequest {
    pub enabled: bool,
}

/// `PATCH /_/api/tables/{name}/rls` — flips RLS on or off for a table
/// (spec §6); wraps the same `enable_rls`/`disable_rls` operations the
/// dashboard's dedicated toggle buttons already drive.
pub async fn set_rls_status(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(body): Json<SetRlsRequest>,
) -> AppResult<Json<RlsStatus>> {
    if body.enabled {
        rls::enable_rls(&state.db, &table).await?;
    } else {
        rls::disable_rls(&state.db, &table).await?;
    }
    Ok(Json(RlsStatus { enabled: body.enabled }))
}
