//! Full-text search administration and query surface (spec §4.6, §6).

use crate::error::AppResult;
use crate::fts::{self, FtsHit, QueryType};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreateIndexRequest {
    pub table: String,
    pub columns: Vec<String>,
}

pub async fn create_index(
    State(state): State<AppState>,
    Path(index_name): Path<String>,
    Json(body): Json<CreateIndexRequest>,
) -> AppResult<StatusCode> {
    fts::create_index(&state.db, &body.table, &index_name, &body.columns).await?;
    Ok(StatusCode::CREATED)
}

pub async fn rebuild_index(State(state): State<AppState>, Path(index_name): Path<String>) -> AppResult<StatusCode> {
    fts::rebuild_index(&state.db, &index_name).await?;
    Ok(StatusCode::OK)
}

pub async fn drop_index(State(state): State<AppState>, Path(index_name): Path<String>) -> AppResult<StatusCode> {
    fts::drop_index(&state.db, &index_name).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn default_query_type() -> String {
    "plain".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_query_type", rename = "type")]
    pub query_type: String,
}

pub async fn search(
    State(state): State<AppState>,
    Path(index_name): Path<String>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<FtsHit>>> {
    let query_type = QueryType::parse(&query.query_type)?;
    Ok(Json(fts::search(&state.db, &index_name, &query.q, query_type).await?))
}
