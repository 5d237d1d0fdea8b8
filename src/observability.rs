//! Observability sidecar: time-bucketed metric writes and windowed
//! queries over `_observability_metrics` (spec §4.7). Kept as plain rows
//! in the same SQLite handle rather than a separate metrics backend —
//! the whole point of the single-process design is that there is no
//! second store to keep in sync.

use crate::db::Database;
use crate::error::AppError;
use chrono::Utc;
use serde::Serialize;
use sqlx::Row;

/// Render a tag set as the comma-joined `key:value` string the catalog
/// stores (spec §3: "`tags` is a comma-joined `key:value` string").
#[must_use]
pub fn format_tags(pairs: &[(&str, &str)]) -> String {
    pairs.iter().map(|(k, v)| format!("{k}:{v}")).collect::<Vec<_>>().join(",")
}

/// Parse a `format_tags` string back into its `key:value` pairs, tolerating
/// malformed entries (dropped rather than failing the whole query — spec
/// §7 "a failed sample is dropped rather than blocking serving").
#[must_use]
pub fn parse_tags(tags: &str) -> std::collections::HashMap<String, String> {
    tags.split(',')
        .filter_map(|pair| pair.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Record one metric observation. `tags` should be built with
/// [`format_tags`] so readers can parse it back consistently.
pub async fn record_metric(db: &Database, name: &str, value: f64, tags: &str) -> Result<(), AppError> {
    sqlx::query("INSERT INTO _observability_metrics (timestamp, metric_name, value, tags) VALUES (?, ?, ?, ?)")
        .bind(Utc::now().to_rfc3339())
        .bind(name)
        .bind(value)
        .bind(tags)
        .execute(db.pool())
        .await?;
    Ok(())
}

/// Record one request's timing as the paired `request_count`/
/// `request_duration_ms` samples spec §4.7 calls for, sharing a single
/// timestamp and tag set so [`trace_summary`] can join them back up.
pub async fn record_request_timing(
    db: &Database,
    method: &str,
    path: &str,
    status: u16,
    duration_ms: f64,
) -> Result<(), AppError> {
    let tags = format_tags(&[("method", method), ("path", path), ("status", &status.to_string())]);
    let timestamp = Utc::now().to_rfc3339();
    for (name, value) in [("request_count", 1.0), ("request_duration_ms", duration_ms)] {
        sqlx::query("INSERT INTO _observability_metrics (timestamp, metric_name, value, tags) VALUES (?, ?, ?, ?)")
            .bind(&timestamp)
            .bind(name)
            .bind(value)
            .bind(&tags)
            .execute(db.pool())
            .await?;
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricPoint {
    pub timestamp: String,
    pub metric_name: String,
    pub value: f64,
    pub tags: String,
}

/// Every metric sample recorded in the trailing `minutes` window, grouped
/// by `metric_name` and ordered ascending by time within each group (spec
/// §4.7 "Read ... returns rows grouped by `metric_name` in ascending time
/// order").
pub async fn query_metrics(db: &Database, minutes: i64) -> Result<Vec<MetricPoint>, AppError> {
    let since = (Utc::now() - chrono::Duration::minutes(minutes)).to_rfc3339();
    let rows = sqlx::query(
        "SELECT timestamp, metric_name, value, tags FROM _observability_metrics
         WHERE timestamp >= ?
         ORDER BY metric_name, timestamp ASC",
    )
    .bind(since)
    .fetch_all(db.pool())
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| MetricPoint {
            timestamp: row.get("timestamp"),
            metric_name: row.get("metric_name"),
            value: row.get("value"),
            tags: row.get("tags"),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    pub timestamp: String,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status: Option<String>,
    pub duration_ms: f64,
}

/// Filters accepted by [`trace_summary`] (spec §4.7 "applies optional
/// `method`, `path`, `status` filters").
#[derive(Debug, Clone, Default)]
pub struct TraceFilter {
    pub method: Option<String>,
    pub path: Option<String>,
    pub status: Option<String>,
}

/// Join `request_count` rows with their paired `request_duration_ms`
/// sample on `(timestamp, tags)` within the trailing 15-minute window
/// (spec §4.7), apply the caller's filters, and return up to `limit`
/// records with parsed tag fields. Fixed-width window: the endpoint is a
/// live trace view, not an arbitrary historical range query (unlike
/// [`query_metrics`]).
pub async fn trace_summary(db: &Database, filter: &TraceFilter, limit: i64) -> Result<Vec<TraceRecord>, AppError> {
    let since = (Utc::now() - chrono::Duration::minutes(15)).to_rfc3339();
    let rows = sqlx::query(
        "SELECT c.timestamp AS timestamp, c.tags AS tags, d.value AS duration_ms
         FROM _observability_metrics c
         JOIN _observability_metrics d
           ON c.timestamp = d.timestamp AND c.tags = d.tags AND d.metric_name = 'request_duration_ms'
         WHERE c.metric_name = 'request_count' AND c.timestamp >= ?
         ORDER BY c.timestamp DESC",
    )
    .bind(since)
    .fetch_all(db.pool())
    .await?;

    let mut out = Vec::new();
    for row in rows {
        let timestamp: String = row.get("timestamp");
        let tags: String = row.get("tags");
        let duration_ms: f64 = row.get("duration_ms");
        let parsed = parse_tags(&tags);
        let method = parsed.get("method").cloned();
        let path = parsed.get("path").cloned();
        let status = parsed.get("status").cloned();

        if let Some(want) = &filter.method {
            if method.as_deref() != Some(want.as_str()) {
                continue;
            }
        }
        if let Some(want) = &filter.path {
            if path.as_deref() != Some(want.as_str()) {
                continue;
            }
        }
        if let Some(want) = &filter.status {
            if status.as_deref() != Some(want.as_str()) {
                continue;
            }
        }

        out.push(TraceRecord { timestamp, method, path, status, duration_ms });
        if out.len() as i64 >= limit {
            break;
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct ObservabilityStatus {
    pub window_minutes: i64,
    pub request_count: i64,
    pub error_count: i64,
    pub avg_duration_ms: f64,
}

/// Rolling health snapshot over the trailing `minutes` window (spec §4.7,
/// §6: "status" is a fixed-window rollup, not an arbitrary `since`/`until`
/// range, so the dashboard's live status widget can poll it cheaply).
/// Errors are request-count samples tagged `status:5xx` and up.
pub async fn status(db: &Database, minutes: i64) -> Result<ObservabilityStatus, AppError> {
    let since = (Utc::now() - chrono::Duration::minutes(minutes)).to_rfc3339();
    let row = sqlx::query(
        "SELECT
            COALESCE((SELECT COUNT(*) FROM _observability_metrics
                      WHERE metric_name = 'request_count' AND timestamp >= ?), 0) AS request_count,
            COALESCE((SELECT COUNT(*) FROM _observability_metrics
                      WHERE metric_name = 'request_count' AND timestamp >= ?
                        AND tags LIKE '%status:5%'), 0) AS error_count,
            COALESCE((SELECT AVG(value) FROM _observability_metrics
                      WHERE metric_name = 'request_duration_ms' AND timestamp >= ?), 0.0) AS avg_duration_ms",
    )
    .bind(&since)
    .bind(&since)
    .bind(&since)
    .fetch_one(db.pool())
    .await?;
    Ok(ObservabilityStatus {
        window_minutes: minutes,
        request_count: row.get("request_count"),
        error_count: row.get("error_count"),
        avg_duration_ms: row.get("avg_duration_ms"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        let tags = format_tags(&[("method", "GET"), ("path", "/x"), ("status", "200")]);
        assert_eq!(tags, "method:GET,path:/x,status:200");
        let parsed = parse_tags(&tags);
        assert_eq!(parsed.get("method").map(String::as_str), Some("GET"));
        assert_eq!(parsed.get("status").map(String::as_str), Some("200"));
    }

    #[tokio::test]
    async fn query_metrics_groups_by_name_within_window() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        record_request_timing(&db, "GET", "/x", 200, 12.0).await.unwrap();
        let points = query_metrics(&db, 5).await.unwrap();
        assert_eq!(points.len(), 2);
        assert!(points.iter().any(|p| p.metric_name == "request_count"));
        assert!(points.iter().any(|p| p.metric_name == "request_duration_ms"));
    }

    #[tokio::test]
    async fn status_rolls_up_counts_and_average_duration() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        record_request_timing(&db, "GET", "/x", 200, 10.0).await.unwrap();
        record_request_timing(&db, "GET", "/x", 200, 30.0).await.unwrap();
        record_request_timing(&db, "GET", "/x", 500, 5.0).await.unwrap();

        let snapshot = status(&db, 5).await.unwrap();
        assert_eq!(snapshot.window_minutes, 5);
        assert_eq!(snapshot.request_count, 3);
        assert_eq!(snapshot.error_count, 1);
        assert!((snapshot.avg_duration_ms - 15.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn trace_summary_joins_and_parses_tags() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        record_request_timing(&db, "GET", "/x", 200, 10.0).await.unwrap();
        record_request_timing(&db, "POST", "/y", 201, 20.0).await.unwrap();

        let all = trace_summary(&db, &TraceFilter::default(), 100).await.unwrap();
        assert_eq!(all.len(), 2);

        let filtered =
            trace_summary(&db, &TraceFilter { method: Some("POST".to_string()), ..Default::default() }, 100)
                .await
                .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].path.as_deref(), Some("/y"));
        assert!((filtered[0].duration_ms - 20.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn trace_summary_respects_limit() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        for _ in 0..5 {
            record_request_timing(&db, "GET", "/x", 200, 1.0).await.unwrap();
        }
        let limited = trace_summary(&db, &TraceFilter::default(), 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }
}
