//! The single database handle and the generic row reader.
//!
//! The spec's data model calls for one long-lived connection shared by
//! every component (§3 "Database handle", §5 "shared by reference"). We
//! wrap a `SqlitePool` rather than a bare `SqliteConnection` so that
//! readers may run concurrently with the writer under SQLite's WAL mode,
//! but every write-shaped call here goes through the same pool — there is
//! no per-request connection routing to reason about.
//!
//! [`ColumnValue`] and [`row_to_pairs`] are the single type-erased row
//! reader spec.md §9 calls for ("reflection over column scans... a
//! single, type-erased row reader that returns an ordered list of
//! `(name, Scalar)` pairs"); no component downstream hand-writes
//! per-table scan code.

use serde_json::Value as JsonValue;
use sqlx::{sqlite::SqlitePoolOptions, sqlite::SqliteArguments, Arguments, Column, Row, SqlitePool, TypeInfo};
use std::str::FromStr;

use crate::error::AppError;

/// Bind a caller-supplied JSON value onto a set of SQLite arguments, used
/// by the CRUD generator to pass insert/update values through without
/// ever interpolating them into SQL text. Objects/arrays are stored as
/// their JSON text form.
pub fn bind_json_value<'a>(args: &mut SqliteArguments<'a>, value: &'a JsonValue) {
    match value {
        JsonValue::Null => {
            args.add(None::<String>).ok();
        }
        JsonValue::Bool(b) => {
            args.add(i64::from(*b)).ok();
        }
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                args.add(i).ok();
            } else if let Some(f) = n.as_f64() {
                args.add(f).ok();
            }
        }
        JsonValue::String(s) => {
            args.add(s.as_str()).ok();
        }
        other => {
            args.add(other.to_string()).ok();
        }
    }
}

/// A decoded SQLite column value, erased to a small closed set of variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl ColumnValue {
    /// Render as a [`serde_json::Value`] for API responses.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Integer(v) => JsonValue::from(*v),
            Self::Real(v) => JsonValue::from(*v),
            Self::Text(v) => JsonValue::from(v.clone()),
            Self::Blob(v) => JsonValue::from(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                v,
            )),
        }
    }

    /// Render as a value suitable for embedding in a CSV cell or SQL export.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Integer(v) => v.to_string(),
            Self::Real(v) => v.to_string(),
            Self::Text(v) => v.clone(),
            Self::Blob(v) => base64::Engine::encode(&base64::engine::general_purpose::STANDARD, v),
        }
    }
}

/// Decode one `SqliteRow` into an ordered list of `(column_name, value)`
/// pairs. SQLite's dynamic typing means the declared column type and the
/// value's storage class can diverge; we trust the storage class reported
/// by the driver over the declared type name, falling back to text.
#[must_use]
pub fn row_to_pairs(row: &sqlx::sqlite::SqliteRow) -> Vec<(String, ColumnValue)> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let name = column.name().to_string();
            let value = decode_column(row, i, column.type_info().name());
            (name, value)
        })
        .collect()
}

fn decode_column(row: &sqlx::sqlite::SqliteRow, index: usize, declared_type: &str) -> ColumnValue {
    use sqlx::ValueRef;

    let Ok(raw) = row.try_get_raw(index) else {
        return ColumnValue::Null;
    };
    if raw.is_null() {
        return ColumnValue::Null;
    }

    match declared_type.to_uppercase().as_str() {
        "INTEGER" | "INT" | "BOOLEAN" => row
            .try_get::<i64, _>(index)
            .map(ColumnValue::Integer)
            .unwrap_or(ColumnValue::Null),
        "REAL" | "FLOAT" | "DOUBLE" => row
            .try_get::<f64, _>(index)
            .map(ColumnValue::Real)
            .unwrap_or(ColumnValue::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(ColumnValue::Blob)
            .unwrap_or(ColumnValue::Null),
        _ => row
            .try_get::<String, _>(index)
            .map(ColumnValue::Text)
            .or_else(|_| row.try_get::<i64, _>(index).map(ColumnValue::Integer))
            .or_else(|_| row.try_get::<f64, _>(index).map(ColumnValue::Real))
            .unwrap_or(ColumnValue::Null),
    }
}

/// The process-lifetime database handle, shared by reference across every
/// component (catalog, DDL engine, CRUD generator, RLS evaluator, ...).
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (and create if missing) the SQLite file at `path`, running
    /// bootstrap DDL for the core's shadow tables.
    pub async fn connect(path: &str) -> Result<Self, AppError> {
        let url = if path == "sqlite::memory:" {
            path.to_string()
        } else {
            format!("sqlite://{path}?mode=rwc")
        };
        let opts = sqlx::sqlite::SqliteConnectOptions::from_str(&url)
            .map_err(|e| AppError::Internal(e.to_string()))?
            .foreign_keys(true)
            .create_if_missing(true);
        // An in-memory database is private to the connection that opened it;
        // pooling more than one connection against "sqlite::memory:" would
        // scatter state across independent, empty databases.
        let max_connections = if path == "sqlite::memory:" { 1 } else { 8 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;
        let db = Self { pool };
        db.bootstrap().await?;
        Ok(db)
    }

    /// The underlying pool, for components that need raw `sqlx::query*` access.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn bootstrap(&self) -> Result<(), AppError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS _columns (
                table_name TEXT NOT NULL,
                column_name TEXT NOT NULL,
                pg_type TEXT NOT NULL,
                is_nullable INTEGER NOT NULL DEFAULT 1,
                default_value TEXT,
                is_primary INTEGER NOT NULL DEFAULT 0,
                description TEXT,
                PRIMARY KEY (table_name, column_name)
            )",
            "CREATE TABLE IF NOT EXISTS _schema_migrations (
                version TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                inserted_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f+00','now'))
            )",
            "CREATE TABLE IF NOT EXISTS _rls_policies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_name TEXT NOT NULL,
                policy_name TEXT NOT NULL,
                command TEXT NOT NULL,
                using_expr TEXT,
                check_expr TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                UNIQUE (table_name, policy_name)
            )",
            "CREATE TABLE IF NOT EXISTS _rls_tables (
                table_name TEXT PRIMARY KEY,
                enabled INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE TABLE IF NOT EXISTS _fts_indexes (
                table_name TEXT NOT NULL,
                index_name TEXT NOT NULL PRIMARY KEY,
                columns TEXT NOT NULL,
                tokenizer TEXT NOT NULL DEFAULT 'porter'
            )",
            "CREATE TABLE IF NOT EXISTS _dashboard (
                key TEXT PRIMARY KEY,
                value TEXT
            )",
            "CREATE TABLE IF NOT EXISTS _settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS _email_templates (
                name TEXT PRIMARY KEY,
                subject TEXT NOT NULL,
                body TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS auth_users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE,
                encrypted_password TEXT,
                email_confirmed_at TEXT,
                is_anonymous INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f+00','now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f+00','now'))
            )",
            "CREATE TABLE IF NOT EXISTS auth_verification_tokens (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES auth_users(id) ON DELETE CASCADE,
                type TEXT NOT NULL,
                email TEXT,
                expires_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS _observability_metrics (
                timestamp TEXT NOT NULL,
                metric_name TEXT NOT NULL,
                value REAL NOT NULL,
                tags TEXT NOT NULL DEFAULT ''
            )",
        ];
        for stmt in statements {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }
}
