//! Observability query surface (spec §4.7, §6).

use crate::error::{AppError, AppResult};
use crate::observability::{self, MetricPoint, ObservabilityStatus, TraceFilter, TraceRecord};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    #[serde(default = "default_minutes")]
    pub minutes: i64,
}

fn default_minutes() -> i64 {
    5
}

/// `GET /_/api/observability/metrics?minutes=N` — every sample in the
/// trailing window, grouped by metric name (spec §4.7, §6).
pub async fn metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> AppResult<Json<Vec<MetricPoint>>> {
    if !(1..=60).contains(&query.minutes) {
        return Err(AppError::Validation("minutes must be between 1 and 60".to_string()));
    }
    Ok(Json(observability::query_metrics(&state.db, query.minutes).await?))
}

#[derive(Debug, Deserialize)]
pub struct TraceQuery {
    pub method: Option<String>,
    pub path: Option<String>,
    pub status: Option<String>,
    #[serde(default = "default_trace_limit")]
    pub limit: i64,
}

fn default_trace_limit() -> i64 {
    100
}

/// `GET /_/api/observability/traces` — request/duration pairs from the
/// trailing 15-minute window, optionally filtered (spec §4.7, §6).
pub async fn traces(
    State(state): State<AppState>,
    Query(query): Query<TraceQuery>,
) -> AppResult<Json<Vec<TraceRecord>>> {
    let filter = TraceFilter { method: query.method, path: query.path, status: query.status };
    let limit = query.limit.clamp(1, 100);
    Ok(Json(observability::trace_summary(&state.db, &filter, limit).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(default = "default_minutes")]
    pub minutes: i64,
}

/// `GET /_/api/observability/status?minutes=N` — rolling health snapshot,
/// `minutes` clamped to `[1, 60]` (spec §6).
pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> AppResult<Json<ObservabilityStatus>> {
    if !(1..=60).contains(&query.minutes) {
        return Err(AppError::Validation("minutes must be between 1 and 60".to_string()));
    }
    Ok(Json(observability::status(&state.db, query.minutes).await?))
}
