//! Schema catalog — the shadow `_columns` metadata that preserves
//! PostgreSQL-level type information lost on a round trip through
//! SQLite's dynamic typing (spec §3, §4.2).

use crate::db::Database;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use sqlx::Row;

/// The PG type vocabulary the catalog recognises. Extensible by construction
/// (any string is accepted), but these are the ones auto-registration infers.
pub const PG_TYPES: &[&str] = &[
    "uuid",
    "text",
    "integer",
    "numeric",
    "boolean",
    "bytea",
    "jsonb",
    "timestamptz",
];

/// Reserved identifier prefixes a user table must not use (spec §3).
pub const RESERVED_PREFIXES: &[&str] = &["_", "auth_", "storage_"];

/// One row of the `_columns` shadow catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnInfo {
    pub table_name: String,
    pub column_name: String,
    pub pg_type: String,
    pub is_nullable: bool,
    pub default_value: Option<String>,
    pub is_primary: bool,
    pub description: Option<String>,
}

/// Returns `Err` if `name` is not a valid, non-reserved user table identifier.
pub fn validate_table_name(name: &str) -> Result<(), AppError> {
    let re = regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern");
    if !re.is_match(name) {
        return Err(AppError::Validation(format!(
            "invalid table name: {name}"
        )));
    }
    if name == "sqlite_sequence" {
        return Err(AppError::Validation(
            "sqlite_sequence is a reserved name".to_string(),
        ));
    }
    for prefix in RESERVED_PREFIXES {
        if name.starts_with(prefix) {
            return Err(AppError::Validation(format!(
                "table names may not start with reserved prefix '{prefix}'"
            )));
        }
    }
    Ok(())
}

/// Infer a PG type from a SQLite column's declared type affinity, following
/// the standard SQLite type-affinity rules (INTEGER/TEXT/BLOB/REAL/NUMERIC).
#[must_use]
pub fn infer_pg_type(sqlite_decl_type: &str) -> &'static str {
    let t = sqlite_decl_type.to_uppercase();
    if t.contains("INT") {
        "integer"
    } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
        "text"
    } else if t.contains("BLOB") || t.is_empty() {
        "bytea"
    } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
        "numeric"
    } else if t.contains("BOOL") {
        "boolean"
    } else {
        "text"
    }
}

/// Physical column information read directly off SQLite's `table_info` pragma.
struct PhysicalColumn {
    name: String,
    decl_type: String,
    not_null: bool,
    default_value: Option<String>,
    is_primary: bool,
}

async fn physical_columns(
    conn: &mut sqlx::SqliteConnection,
    table: &str,
) -> Result<Vec<PhysicalColumn>, AppError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| PhysicalColumn {
            name: row.get::<String, _>("name"),
            decl_type: row.get::<String, _>("type"),
            not_null: row.get::<i64, _>("notnull") != 0,
            default_value: row.get::<Option<String>, _>("dflt_value"),
            is_primary: row.get::<i64, _>("pk") != 0,
        })
        .collect())
}

/// Ensure every physical column of `table` has a catalog row, inferring PG
/// types for any that are missing, against an arbitrary connection (so a
/// caller mid-transaction — the DDL engine — can fold this into the same
/// transaction as the physical change; spec §4.2 "one transaction that
/// encompasses the physical change and the catalog update"). Never
/// updates or deletes existing rows — human-supplied metadata always wins.
///
/// Races between concurrent callers registering the same column are
/// resolved by treating the resulting unique-constraint violation as
/// idempotent success (spec §5) — anything else is a real failure.
pub async fn ensure_table_registered_conn(
    conn: &mut sqlx::SqliteConnection,
    table: &str,
) -> Result<(), AppError> {
    validate_table_name(table)?;
    let physical = physical_columns(conn, table).await?;
    if physical.is_empty() {
        return Err(AppError::NotFound(format!("table not found: {table}")));
    }

    let existing: Vec<String> = sqlx::query(
        "SELECT column_name FROM _columns WHERE table_name = ?",
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|row| row.get::<String, _>("column_name"))
    .collect();

    for column in physical {
        if existing.contains(&column.name) {
            continue;
        }
        let pg_type = infer_pg_type(&column.decl_type);
        let result = sqlx::query(
            "INSERT INTO _columns (table_name, column_name, pg_type, is_nullable, default_value, is_primary, description)
             VALUES (?, ?, ?, ?, ?, ?, NULL)",
        )
        .bind(table)
        .bind(&column.name)
        .bind(pg_type)
        .bind(!column.not_null)
        .bind(&column.default_value)
        .bind(column.is_primary)
        .execute(&mut *conn)
        .await;

        if let Err(sqlx::Error::Database(db_err)) = &result {
            if db_err.is_unique_violation() {
                // Another handler beat us to it — idempotent success.
                continue;
            }
        }
        result?;
    }
    Ok(())
}

/// [`ensure_table_registered_conn`] against the shared pool, for read paths
/// outside a DDL transaction (e.g. `list_columns`, `record_uuid_defaults`).
pub async fn ensure_table_registered(db: &Database, table: &str) -> Result<(), AppError> {
    let mut conn = db.pool().acquire().await?;
    ensure_table_registered_conn(&mut conn, table).await
}

/// List the catalog rows for `table`, auto-registering first (spec §4.2:
/// "on every operation that needs per-column type information ...the
/// catalog first calls ensureTableRegistered").
pub async fn list_columns(db: &Database, table: &str) -> Result<Vec<ColumnInfo>, AppError> {
    ensure_table_registered(db, table).await?;
    let rows = sqlx::query(
        "SELECT table_name, column_name, pg_type, is_nullable, default_value, is_primary, description
         FROM _columns WHERE table_name = ? ORDER BY column_name",
    )
    .bind(table)
    .fetch_all(db.pool())
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| ColumnInfo {
            table_name: row.get("table_name"),
            column_name: row.get("column_name"),
            pg_type: row.get("pg_type"),
            is_nullable: row.get::<i64, _>("is_nullable") != 0,
            default_value: row.get("default_value"),
            is_primary: row.get::<i64, _>("is_primary") != 0,
            description: row.get("description"),
        })
        .collect())
}

/// List every user-defined table (excludes sqlite/system and shadow tables).
pub async fn list_tables(db: &Database) -> Result<Vec<String>, AppError> {
    let rows = sqlx::query(
        "SELECT name FROM sqlite_master
         WHERE type = 'table'
           AND name NOT LIKE 'sqlite_%'
           AND name NOT LIKE '\\_%' ESCAPE '\\'
           AND name NOT LIKE 'auth\\_%' ESCAPE '\\'
           AND name NOT LIKE 'storage\\_%' ESCAPE '\\'
         ORDER BY name",
    )
    .fetch_all(db.pool())
    .await?;
    Ok(rows.into_iter().map(|row| row.get("name")).collect())
}

/// The sentinel the catalog stores in `default_value` for a column whose
/// PG-syntax default was `gen_random_uuid()` (spec §4.1 "UUID-default
/// follow-through"): the translator rewrites the physical SQLite default
/// to a `randomblob`/`hex` expression, so this literal is what the
/// catalog remembers instead, both for re-emission in PG-syntax exports
/// and as the marker [`uuid_default_columns`] looks for.
pub const GEN_RANDOM_UUID_DEFAULT: &str = "gen_random_uuid()";

/// Record that `columns` of `table` default to `gen_random_uuid()` in PG
/// syntax, overwriting whatever `ensure_table_registered` inferred for
/// `default_value` on those rows specifically — this is translator
/// metadata about the statement actually executed, not a guess from
/// physical schema inspection, so it is allowed to overwrite.
pub async fn record_uuid_defaults(db: &Database, table: &str, columns: &[String]) -> Result<(), AppError> {
    ensure_table_registered(db, table).await?;
    for column in columns {
        sqlx::query(
            "UPDATE _columns SET default_value = ? WHERE table_name = ? AND column_name = ?",
        )
        .bind(GEN_RANDOM_UUID_DEFAULT)
        .bind(table)
        .bind(column)
        .execute(db.pool())
        .await?;
    }
    Ok(())
}

/// Columns of `table` whose catalog default is `gen_random_uuid()`, used
/// to drive the INSERT-time UUID injection (spec §4.1).
pub async fn uuid_default_columns(db: &Database, table: &str) -> Result<Vec<String>, AppError> {
    let rows = sqlx::query(
        "SELECT column_name FROM _columns WHERE table_name = ? AND default_value = ?",
    )
    .bind(table)
    .bind(GEN_RANDOM_UUID_DEFAULT)
    .fetch_all(db.pool())
    .await?;
    Ok(rows.into_iter().map(|row| row.get("column_name")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn auto_registration_populates_empty_catalog() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE widgets (id TEXT PRIMARY KEY, qty INTEGER)")
            .execute(db.pool())
            .await
            .unwrap();

        let columns = list_columns(&db, "widgets").await.unwrap();
        assert_eq!(columns.len(), 2);
        let qty = columns.iter().find(|c| c.column_name == "qty").unwrap();
        assert_eq!(qty.pg_type, "integer");
    }

    #[tokio::test]
    async fn auto_registration_never_overwrites_human_metadata() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE widgets (id TEXT PRIMARY KEY)")
            .execute(db.pool())
            .await
            .unwrap();
        ensure_table_registered(&db, "widgets").await.unwrap();

        sqlx::query("UPDATE _columns SET description = 'curated' WHERE table_name='widgets' AND column_name='id'")
            .execute(db.pool())
            .await
            .unwrap();

        ensure_table_registered(&db, "widgets").await.unwrap();
        let columns = list_columns(&db, "widgets").await.unwrap();
        assert_eq!(columns[0].description.as_deref(), Some("curated"));
    }

    #[test]
    fn rejects_reserved_prefixes() {
        assert!(validate_table_name("_internal").is_err());
        assert!(validate_table_name("auth_profile").is_err());
        assert!(validate_table_name("storage_bucket").is_err());
        assert!(validate_table_name("sqlite_sequence").is_err());
        assert!(validate_table_name("9bad").is_err());
        assert!(validate_table_name("widgets").is_ok());
    }
}
