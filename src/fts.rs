//! Full-text search: shadow `fts5` virtual tables keyed by the source
//! table's primary key, managed through `_fts_indexes` (spec §4.6).

use crate::catalog::validate_table_name;
use crate::db::Database;
use crate::error::AppError;
use serde::Serialize;
use sqlx::Row;

/// Results are capped at 100 rows (spec §4.6).
pub const MAX_RESULTS: i64 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct FtsHit {
    pub rowid: i64,
    pub rank: f64,
}

/// The query dialects the search test harness accepts (spec §4.6: "a
/// query type ∈ `{plain, phrase, websearch, fts}`"), mirroring
/// PostgreSQL's `plainto_tsquery`/`phraseto_tsquery`/`websearch_to_tsquery`
/// family, translated to `fts5` MATCH syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// Bare words, implicitly ANDed; any `fts5` operator syntax in the
    /// input is treated as ordinary text (like `plainto_tsquery`).
    Plain,
    /// The whole input matched as one ordered phrase.
    Phrase,
    /// Web-search-style: `"quoted phrases"`, bare words (AND), `-excluded`
    /// terms, and a literal `OR` between alternatives.
    Websearch,
    /// The input is already `fts5` MATCH syntax; passed through verbatim.
    Fts,
}

impl QueryType {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "plain" => Ok(Self::Plain),
            "phrase" => Ok(Self::Phrase),
            "websearch" => Ok(Self::Websearch),
            "fts" => Ok(Self::Fts),
            other => Err(AppError::Validation(format!("unknown fts query type: {other}"))),
        }
    }
}

fn escape_fts_literal(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}

/// Translate a user query string under `query_type` into `fts5` MATCH
/// syntax.
#[must_use]
pub fn build_match_expr(query_type: QueryType, raw: &str) -> String {
    match query_type {
        QueryType::Fts => raw.to_string(),
        QueryType::Phrase => escape_fts_literal(raw.trim()),
        QueryType::Plain => raw
            .split_whitespace()
            .map(escape_fts_literal)
            .collect::<Vec<_>>()
            .join(" "),
        QueryType::Websearch => {
            let mut clauses = Vec::new();
            let mut chars = raw.trim().chars().peekable();
            let mut buf = String::new();
            let flush = |buf: &mut String, clauses: &mut Vec<String>| {
                if !buf.is_empty() {
                    let term = std::mem::take(buf);
                    if term.eq_ignore_ascii_case("or") {
                        clauses.push("OR".to_string());
                    } else if let Some(excluded) = term.strip_prefix('-') {
                        if !excluded.is_empty() {
                            clauses.push(format!("NOT {}", escape_fts_literal(excluded)));
                        }
                    } else {
                        clauses.push(escape_fts_literal(&term));
                    }
                }
            };
            while let Some(&c) = chars.peek() {
                if c == '"' {
                    chars.next();
                    let mut phrase = String::new();
                    for c2 in chars.by_ref() {
                        if c2 == '"' {
                            break;
                        }
                        phrase.push(c2);
                    }
                    if !phrase.is_empty() {
                        clauses.push(escape_fts_literal(&phrase));
                    }
                } else if c.is_whitespace() {
                    flush(&mut buf, &mut clauses);
                    chars.next();
                } else {
                    buf.push(c);
                    chars.next();
                }
            }
            flush(&mut buf, &mut clauses);
            clauses.join(" ")
        }
    }
}

fn shadow_name(index_name: &str) -> String {
    format!("_fts_{index_name}")
}

/// Create an FTS index over `columns` of `table`, backed by an `fts5`
/// virtual table, and populate it from the table's current contents.
pub async fn create_index(
    db: &Database,
    table: &str,
    index_name: &str,
    columns: &[String],
) -> Result<(), AppError> {
    validate_table_name(table)?;
    validate_table_name(index_name)?;
    if columns.is_empty() {
        return Err(AppError::Validation("fts index needs at least one column".to_string()));
    }
    for c in columns {
        validate_table_name(c)?;
    }

    let shadow = shadow_name(index_name);
    let column_list = columns.join(", ");
    let mut tx = db.pool().begin().await?;
    sqlx::query(&format!(
        "CREATE VIRTUAL TABLE \"{shadow}\" USING fts5({column_list}, content='{table}', content_rowid='rowid', tokenize='porter')"
    ))
    .execute(&mut *tx)
    .await?;
    sqlx::query(&format!("INSERT INTO \"{shadow}\"(\"{shadow}\") VALUES ('rebuild')"))
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO _fts_indexes (table_name, index_name, columns, tokenizer) VALUES (?, ?, ?, 'porter')")
        .bind(table)
        .bind(index_name)
        .bind(&column_list)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    tracing::info!(table = %table, index = %index_name, "created fts index");
    Ok(())
}

/// Rebuild an existing index from the current contents of its source table.
pub async fn rebuild_index(db: &Database, index_name: &str) -> Result<(), AppError> {
    let shadow = shadow_name(index_name);
    let exists = sqlx::query("SELECT 1 FROM _fts_indexes WHERE index_name = ?")
        .bind(index_name)
        .fetch_optional(db.pool())
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound(format!("fts index not found: {index_name}")));
    }
    sqlx::query(&format!("INSERT INTO \"{shadow}\"(\"{shadow}\") VALUES ('rebuild')"))
        .execute(db.pool())
        .await?;
    Ok(())
}

pub async fn drop_index(db: &Database, index_name: &str) -> Result<(), AppError> {
    let shadow = shadow_name(index_name);
    let mut tx = db.pool().begin().await?;
    sqlx::query(&format!("DROP TABLE IF EXISTS \"{shadow}\"")).execute(&mut *tx).await?;
    sqlx::query("DELETE FROM _fts_indexes WHERE index_name = ?")
        .bind(index_name)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Run a ranked FTS query, capped at [`MAX_RESULTS`] hits.
pub async fn search(
    db: &Database,
    index_name: &str,
    query: &str,
    query_type: QueryType,
) -> Result<Vec<FtsHit>, AppError> {
    let shadow = shadow_name(index_name);
    let exists = sqlx::query("SELECT 1 FROM _fts_indexes WHERE index_name = ?")
        .bind(index_name)
        .fetch_optional(db.pool())
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound(format!("fts index not found: {index_name}")));
    }

    let match_expr = build_match_expr(query_type, query);
    let rows = sqlx::query(&format!(
        "SELECT rowid, bm25(\"{shadow}\") AS rank FROM \"{shadow}\" WHERE \"{shadow}\" MATCH ? ORDER BY rank LIMIT ?"
    ))
    .bind(match_expr)
    .bind(MAX_RESULTS)
    .fetch_all(db.pool())
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| FtsHit {
            rowid: row.get("rowid"),
            rank: row.get("rank"),
        })
        .collect())
}
