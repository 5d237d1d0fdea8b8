//! Observability middleware (spec §4.7, §5 "K logs timings"): times every
//! request and records the paired `request_count`/`request_duration_ms`
//! samples the sidecar's trace join expects. Recording failures are
//! logged and dropped rather than failing the request (spec §7 "a failed
//! sample is dropped rather than blocking serving").

use crate::observability;
use crate::state::AppState;
use axum::{body::Body, extract::{Request, State}, middleware::Next, response::Response};
use std::time::Instant;

pub async fn record_request_metrics(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    let status = response.status().as_u16();
    let db = state.db.clone();
    tokio::spawn(async move {
        if let Err(e) = observability::record_request_timing(&db, &method, &path, status, duration_ms).await {
            tracing::warn!(error = %e, "failed to record request metric");
        }
    });

    response
}
