pub mod auth;
pub mod data;
pub mod export;
pub mod fts;
pub mod observability;
pub mod policies;
pub mod settings;
pub mod sql;
pub mod tables;
pub mod users;

use axum::Json;
use serde_json::json;

/// `/_/api/health` — liveness probe, unauthenticated (SPEC_FULL.md's
/// SUPPLEMENTED FEATURES section).
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
