//! The dashboard's raw SQL editor (spec §4.1, §6): PostgreSQL-flavoured SQL
//! in, translated through [`crate::translator`], executed directly against
//! SQLite. Operator-only — gated by the session middleware, not by RLS
//! (policies apply to the generated CRUD surface, not ad hoc SQL).
//!
//! Engine failures are reported in the response body at HTTP 200 rather
//! than as an error status (spec §6 "SQL response shape", §7 "translate()
//! failures never block execution — the raw SQLite error is shown") so the
//! dashboard's SQL editor can render the failure inline.

use crate::catalog;
use crate::db::row_to_pairs;
use crate::state::AppState;
use crate::translator;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Instant;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SqlRequest {
    pub query: String,
    /// Whether to run the query through the PostgreSQL-syntax translator
    /// before execution. Defaults to `true` (spec §8 scenario 2).
    #[serde(default = "default_true")]
    pub postgres_mode: bool,
}

#[derive(Debug, Serialize)]
pub struct SqlResponse {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Value>,
    pub row_count: usize,
    pub affected_rows: Option<u64>,
    pub execution_time_ms: u128,
    #[serde(rename = "type")]
    pub kind: String,
    pub error: Option<String>,
    pub translated_query: String,
    pub was_translated: bool,
}

/// The detected leading keyword of a (possibly multi-word) statement,
/// upper-cased — `SELECT`, `INSERT`, `UPDATE`, `DELETE`, `CREATE`, ... or
/// `UNKNOWN` if the statement is empty or starts with something else.
fn detect_statement_type(sql: &str) -> String {
    sql.trim_start()
        .split_whitespace()
        .next()
        .map_or_else(|| "UNKNOWN".to_string(), str::to_uppercase)
}

fn is_select(kind: &str) -> bool {
    kind == "SELECT" || kind == "PRAGMA" || kind == "EXPLAIN"
}

pub async fn run(State(state): State<AppState>, Json(body): Json<SqlRequest>) -> Json<SqlResponse> {
    let (mut sql, was_translated) = if body.postgres_mode {
        let translation = translator::translate(&body.query);
        (translation.rewritten, translation.changed)
    } else {
        (body.query.clone(), false)
    };
    let kind = detect_statement_type(&sql);

    // UUID-default follow-through (spec §4.1): an `INSERT` that omits a
    // column the catalog remembers as `DEFAULT gen_random_uuid()` gets that
    // column injected before execution, so PG-mode clients can keep relying
    // on the database to mint primary keys.
    if body.postgres_mode && kind == "INSERT" {
        if let Some(table) = translator::insert_target_table(&sql) {
            if let Ok(uuid_columns) = catalog::uuid_default_columns(&state.db, &table).await {
                if let Some(rewritten) = translator::inject_insert_uuid_defaults(&sql, &uuid_columns) {
                    sql = rewritten;
                }
            }
        }
    }

    let started = Instant::now();
    let (columns, rows, affected_rows, error) = if is_select(&kind) {
        match sqlx::query(&sql).fetch_all(state.db.pool()).await {
            Ok(fetched) => {
                let columns = fetched
                    .first()
                    .map(|row| row_to_pairs(row).into_iter().map(|(name, _)| name).collect())
                    .unwrap_or_default();
                let rows: Vec<serde_json::Value> = fetched
                    .iter()
                    .map(|row| crate::crud::row_to_json(row_to_pairs(row)))
                    .collect();
                (columns, rows, None, None)
            }
            Err(e) => (Vec::new(), Vec::new(), None, Some(e.to_string())),
        }
    } else {
        match sqlx::query(&sql).execute(state.db.pool()).await {
            Ok(result) => (Vec::new(), Vec::new(), Some(result.rows_affected()), None),
            Err(e) => (Vec::new(), Vec::new(), None, Some(e.to_string())),
        }
    };
    let execution_time_ms = started.elapsed().as_millis();

    // Record which columns a freshly created table defaults to
    // `gen_random_uuid()` in PG syntax, so later INSERTs against it can be
    // rewritten above. Uses the untranslated query: the translator has
    // already rewritten `UUID ... DEFAULT gen_random_uuid()` into its
    // SQLite equivalent by the time `sql` reaches here.
    if body.postgres_mode && kind == "CREATE" && error.is_none() {
        let uuid_columns = translator::uuid_default_columns(&body.query);
        if !uuid_columns.is_empty() {
            if let Some(table) = translator::create_table_target(&body.query) {
                let _ = catalog::record_uuid_defaults(&state.db, &table, &uuid_columns).await;
            }
        }
    }

    Json(SqlResponse {
        row_count: rows.len(),
        columns,
        rows,
        affected_rows,
        execution_time_ms,
        kind,
        error,
        translated_query: sql,
        was_translated,
    })
}
