//! Export surface (spec §2 "Export Engine", §6): schema DDL, per-table CSV/JSON dumps,
//! and the full ZIP bundle.

use crate::error::AppResult;
use crate::export;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;

pub async fn schema_sql(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let sql = export::export_schema_sql(&state.db).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain")], sql))
}

pub async fn rls_sql(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let sql = export::export_rls_sql(&state.db).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain")], sql))
}

pub async fn table_csv(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> AppResult<impl IntoResponse> {
    let csv = export::export_table_csv(&state.db, &table).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{table}.csv\"")),
        ],
        csv,
    ))
}

pub async fn table_json(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    Ok(Json(export::export_table_json(&state.db, &table).await?))
}

pub async fn bundle(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let zip_bytes = export::export_bundle(&state.db).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"sblite-export.zip\"".to_string()),
        ],
        zip_bytes,
    ))
}

/// `GET /_/api/export/backup` — raw database file download (spec §6).
pub async fn backup(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let bytes = export::export_database_file(&state.config.database.path).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/vnd.sqlite3".to_string()),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"sblite-backup.db\"".to_string()),
        ],
        bytes,
    ))
}
