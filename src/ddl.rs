//! DDL engine & migration journal (spec §4.2, §3 "Migration journal file").
//!
//! Every structural change runs inside one transaction that covers both the
//! physical change and the catalog update; after commit, a migration file
//! is appended atomically: write the file, insert the `_schema_migrations`
//! row, and delete the file again if the insert fails (spec §4.2 steps 1-4).

use crate::catalog::{self, validate_table_name};
use crate::db::Database;
use crate::error::AppError;
use crate::translator;
use chrono::Utc;
use serde::Deserialize;
use sqlx::Row;
use std::path::Path;

/// One column definition in a `CREATE TABLE` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub pg_type: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub nullable: bool,
    pub default: Option<String>,
}

fn pg_to_sqlite_type(pg_type: &str) -> &str {
    match pg_type.to_lowercase().as_str() {
        "uuid" | "text" | "jsonb" | "timestamptz" => "TEXT",
        "integer" => "INTEGER",
        "numeric" => "REAL",
        "boolean" => "INTEGER",
        "bytea" => "BLOB",
        other => other,
    }
}

fn slugify(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Append a migration file and its `_schema_migrations` row atomically
/// (spec §4.2). If the row insert fails, the file is removed again.
async fn record_migration(
    db: &Database,
    migrations_dir: &str,
    slug: &str,
    pg_sql: &str,
) -> Result<(), AppError> {
    tokio::fs::create_dir_all(migrations_dir).await?;
    // Millisecond resolution, not the bare-second format spec.md's source
    // used — concurrent DDL at the same second would otherwise collide on
    // both the filename and the `_schema_migrations` primary key.
    let version = Utc::now().format("%Y%m%d%H%M%S%3f").to_string();
    let filename = format!("{version}_{}.sql", slugify(slug));
    let path = Path::new(migrations_dir).join(&filename);
    tokio::fs::write(&path, pg_sql).await?;

    let result = sqlx::query("INSERT INTO _schema_migrations (version, name) VALUES (?, ?)")
        .bind(&version)
        .bind(slug)
        .execute(db.pool())
        .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(AppError::Internal(format!(
            "failed to record migration: {e}"
        )));
    }
    Ok(())
}

/// `CREATE TABLE` with a caller-supplied column list. Emits PG-syntax DDL
/// to the migration journal (UUID/JSONB/etc. preserved in their PG form,
/// per spec §9's note that the emitter must not re-emit SQLite rewrites).
pub async fn create_table(
    db: &Database,
    migrations_dir: &str,
    table: &str,
    columns: &[ColumnDef],
) -> Result<(), AppError> {
    validate_table_name(table)?;
    if columns.is_empty() {
        return Err(AppError::Validation(
            "table must have at least one column".to_string(),
        ));
    }

    let mut pg_column_sql = Vec::new();
    let mut sqlite_column_sql = Vec::new();
    for col in columns {
        validate_table_name(&col.name)?;
        let mut pg_def = format!("{} {}", col.name, col.pg_type.to_uppercase());
        let mut sqlite_def = format!("{} {}", col.name, pg_to_sqlite_type(&col.pg_type));
        if col.primary {
            pg_def.push_str(" PRIMARY KEY");
            sqlite_def.push_str(" PRIMARY KEY");
        }
        if !col.nullable && !col.primary {
            pg_def.push_str(" NOT NULL");
            sqlite_def.push_str(" NOT NULL");
        }
        if let Some(default) = &col.default {
            pg_def.push_str(&format!(" DEFAULT {default}"));
            let rewritten = translator::translate(&format!("DEFAULT {default}")).rewritten;
            sqlite_def.push_str(&format!(" {rewritten}"));
        }
        pg_column_sql.push(pg_def);
        sqlite_column_sql.push(sqlite_def);
    }

    let pg_sql = format!("CREATE TABLE \"{table}\" ({})", pg_column_sql.join(", "));
    let sqlite_sql = format!("CREATE TABLE \"{table}\" ({})", sqlite_column_sql.join(", "));

    let mut tx = db.pool().begin().await?;
    sqlx::query(&sqlite_sql).execute(&mut *tx).await?;
    catalog::ensure_table_registered_conn(&mut tx, table).await?;
    tx.commit().await?;

    record_migration(db, migrations_dir, &format!("create_{table}_table"), &pg_sql).await?;
    tracing::info!(table = %table, "created table");
    Ok(())
}

/// `DROP TABLE`.
pub async fn drop_table(db: &Database, migrations_dir: &str, table: &str) -> Result<(), AppError> {
    validate_table_name(table)?;
    let mut tx = db.pool().begin().await?;
    sqlx::query(&format!("DROP TABLE \"{table}\"")).execute(&mut *tx).await?;
    sqlx::query("DELETE FROM _columns WHERE table_name = ?")
        .bind(table)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    record_migration(
        db,
        migrations_dir,
        &format!("drop_{table}_table"),
        &format!("DROP TABLE \"{table}\""),
    )
    .await?;
    tracing::info!(table = %table, "dropped table");
    Ok(())
}

/// `ALTER TABLE ... ADD COLUMN`.
pub async fn add_column(
    db: &Database,
    migrations_dir: &str,
    table: &str,
    column: &ColumnDef,
) -> Result<(), AppError> {
    validate_table_name(table)?;
    validate_table_name(&column.name)?;

    let mut sqlite_def = format!("{} {}", column.name, pg_to_sqlite_type(&column.pg_type));
    if let Some(default) = &column.default {
        let rewritten = translator::translate(&format!("DEFAULT {default}")).rewritten;
        sqlite_def.push_str(&format!(" {rewritten}"));
    }

    let mut tx = db.pool().begin().await?;
    sqlx::query(&format!("ALTER TABLE \"{table}\" ADD COLUMN {sqlite_def}"))
        .execute(&mut *tx)
        .await?;
    catalog::ensure_table_registered_conn(&mut tx, table).await?;
    tx.commit().await?;

    let mut pg_def = format!("{} {}", column.name, column.pg_type.to_uppercase());
    if let Some(default) = &column.default {
        pg_def.push_str(&format!(" DEFAULT {default}"));
    }
    record_migration(
        db,
        migrations_dir,
        &format!("add_column_{table}_{}", column.name),
        &format!("ALTER TABLE \"{table}\" ADD COLUMN {pg_def}"),
    )
    .await?;
    tracing::info!(table = %table, column = %column.name, "added column");
    Ok(())
}

/// `ALTER TABLE ... RENAME COLUMN`.
pub async fn rename_column(
    db: &Database,
    migrations_dir: &str,
    table: &str,
    from: &str,
    to: &str,
) -> Result<(), AppError> {
    validate_table_name(table)?;
    validate_table_name(to)?;

    let mut tx = db.pool().begin().await?;
    sqlx::query(&format!(
        "ALTER TABLE \"{table}\" RENAME COLUMN \"{from}\" TO \"{to}\""
    ))
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE _columns SET column_name = ? WHERE table_name = ? AND column_name = ?")
        .bind(to)
        .bind(table)
        .bind(from)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    record_migration(
        db,
        migrations_dir,
        &format!("rename_column_{table}_{from}_to_{to}"),
        &format!("ALTER TABLE \"{table}\" RENAME COLUMN \"{from}\" TO \"{to}\""),
    )
    .await?;
    tracing::info!(table = %table, from = %from, to = %to, "renamed column");
    Ok(())
}

/// `ALTER TABLE ... DROP COLUMN`, implemented as the rebuild-and-rename
/// pattern (create `<t>_new`, copy, drop old, rename) since older SQLite
/// versions cannot drop columns directly (spec §4.2). The migration file
/// still records the logical PG-syntax `DROP COLUMN` so the journal
/// replays against a real PostgreSQL target.
pub async fn drop_column(
    db: &Database,
    migrations_dir: &str,
    table: &str,
    column: &str,
) -> Result<(), AppError> {
    validate_table_name(table)?;
    validate_table_name(column)?;

    let remaining: Vec<String> = sqlx::query(&format!("PRAGMA table_info(\"{table}\")"))
        .fetch_all(db.pool())
        .await?
        .into_iter()
        .map(|row| row.get::<String, _>("name"))
        .filter(|name| name != column)
        .collect();
    if remaining.is_empty() {
        return Err(AppError::Validation(
            "cannot drop the only remaining column".to_string(),
        ));
    }
    let column_list = remaining
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let new_table = format!("{table}_new");

    let mut tx = db.pool().begin().await?;
    sqlx::query(&format!(
        "CREATE TABLE \"{new_table}\" AS SELECT {column_list} FROM \"{table}\""
    ))
    .execute(&mut *tx)
    .await?;
    sqlx::query(&format!("DROP TABLE \"{table}\"")).execute(&mut *tx).await?;
    sqlx::query(&format!("ALTER TABLE \"{new_table}\" RENAME TO \"{table}\""))
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM _columns WHERE table_name = ? AND column_name = ?")
        .bind(table)
        .bind(column)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    record_migration(
        db,
        migrations_dir,
        &format!("drop_column_{table}_{column}"),
        &format!("ALTER TABLE \"{table}\" DROP COLUMN \"{column}\""),
    )
    .await?;
    tracing::info!(table = %table, column = %column, "dropped column (rebuild)");
    Ok(())
}
