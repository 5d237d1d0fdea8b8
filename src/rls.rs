//! Row-level security: policy store and `auth.*()` textual substitution
//! (spec §4.4). Policies live in `_rls_policies`/`_rls_tables`, are
//! evaluated by substituting the caller's claims into the stored
//! `USING`/`CHECK` expressions, and can be exported as real PG-syntax DDL.

use crate::catalog::validate_table_name;
use crate::db::Database;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use sqlx::Row;

/// The four PostgREST-style command scopes a policy may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    Select,
    Insert,
    Update,
    Delete,
    All,
}

impl Command {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::All => "ALL",
        }
    }

    fn parse(s: &str) -> Result<Self, AppError> {
        match s.to_uppercase().as_str() {
            "SELECT" => Ok(Self::Select),
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "ALL" => Ok(Self::All),
            other => Err(AppError::Validation(format!("unknown policy command: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: i64,
    pub table_name: String,
    pub policy_name: String,
    pub command: String,
    pub using_expr: Option<String>,
    pub check_expr: Option<String>,
    pub enabled: bool,
}

/// The caller's identity, substituted into `auth.*()` expressions.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub uid: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
}

fn quote_or_null(value: Option<&str>) -> String {
    value.map_or_else(|| "NULL".to_string(), |v| format!("'{}'", v.replace('\'', "''")))
}

/// Substitute `auth.uid()`, `auth.email()`, and `auth.role()` calls with
/// quoted literal values from `ctx` (spec §4.4: "policy expressions
/// reference `auth.*()`, textually substituted before the expression is
/// embedded in the compiled WHERE clause"). Unauthenticated calls
/// substitute SQL `NULL` for `uid()`/`email()` and the literal `'anon'`
/// role.
#[must_use]
pub fn substitute_auth(expr: &str, ctx: &AuthContext) -> String {
    let uid_literal = quote_or_null(ctx.uid.as_deref());
    let email_literal = quote_or_null(ctx.email.as_deref());
    let role_literal = format!(
        "'{}'",
        ctx.role.as_deref().unwrap_or("anon").replace('\'', "''")
    );
    expr.replace("auth.uid()", &uid_literal)
        .replace("auth.email()", &email_literal)
        .replace("auth.role()", &role_literal)
}

/// Enable RLS bookkeeping for `table` (spec §4.4 `_rls_tables`).
pub async fn enable_rls(db: &Database, table: &str) -> Result<(), AppError> {
    validate_table_name(table)?;
    sqlx::query(
        "INSERT INTO _rls_tables (table_name, enabled) VALUES (?, 1)
         ON CONFLICT(table_name) DO UPDATE SET enabled = 1",
    )
    .bind(table)
    .execute(db.pool())
    .await?;
    Ok(())
}

pub async fn disable_rls(db: &Database, table: &str) -> Result<(), AppError> {
    validate_table_name(table)?;
    sqlx::query(
        "INSERT INTO _rls_tables (table_name, enabled) VALUES (?, 0)
         ON CONFLICT(table_name) DO UPDATE SET enabled = 0",
    )
    .bind(table)
    .execute(db.pool())
    .await?;
    Ok(())
}

pub async fn is_rls_enabled(db: &Database, table: &str) -> Result<bool, AppError> {
    let row = sqlx::query("SELECT enabled FROM _rls_tables WHERE table_name = ?")
        .bind(table)
        .fetch_optional(db.pool())
        .await?;
    Ok(row.is_some_and(|r| r.get::<i64, _>("enabled") != 0))
}

/// Create a named policy on `table`. Fails with [`AppError::Conflict`] if
/// `(table_name, policy_name)` already exists — the store enforces the
/// uniqueness constraint rather than silently upserting (spec §4.4, §8:
/// "for every UNIQUE collision the server responds 409 ... containing
/// 'already exists'").
pub async fn create_policy(
    db: &Database,
    table: &str,
    policy_name: &str,
    command: &str,
    using_expr: Option<&str>,
    check_expr: Option<&str>,
) -> Result<(), AppError> {
    validate_table_name(table)?;
    let command = Command::parse(command)?;
    if using_expr.is_none() && check_expr.is_none() {
        return Err(AppError::Validation(
            "a policy needs at least a USING or CHECK expression".to_string(),
        ));
    }
    let result = sqlx::query(
        "INSERT INTO _rls_policies (table_name, policy_name, command, using_expr, check_expr, enabled)
         VALUES (?, ?, ?, ?, ?, 1)",
    )
    .bind(table)
    .bind(policy_name)
    .bind(command.as_str())
    .bind(using_expr)
    .bind(check_expr)
    .execute(db.pool())
    .await;

    if let Err(sqlx::Error::Database(db_err)) = &result {
        if db_err.is_unique_violation() {
            return Err(AppError::Conflict(format!(
                "policy '{policy_name}' on '{table}' already exists"
            )));
        }
    }
    result?;
    Ok(())
}

/// Update an existing named policy on `table`.
pub async fn update_policy(
    db: &Database,
    table: &str,
    policy_name: &str,
    command: &str,
    using_expr: Option<&str>,
    check_expr: Option<&str>,
) -> Result<(), AppError> {
    validate_table_name(table)?;
    let command = Command::parse(command)?;
    if using_expr.is_none() && check_expr.is_none() {
        return Err(AppError::Validation(
            "a policy needs at least a USING or CHECK expression".to_string(),
        ));
    }
    let result = sqlx::query(
        "UPDATE _rls_policies SET command = ?, using_expr = ?, check_expr = ?
         WHERE table_name = ? AND policy_name = ?",
    )
    .bind(command.as_str())
    .bind(using_expr)
    .bind(check_expr)
    .bind(table)
    .bind(policy_name)
    .execute(db.pool())
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "policy '{policy_name}' on '{table}' not found"
        )));
    }
    Ok(())
}

pub async fn drop_policy(db: &Database, table: &str, policy_name: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM _rls_policies WHERE table_name = ? AND policy_name = ?")
        .bind(table)
        .bind(policy_name)
        .execute(db.pool())
        .await?;
    Ok(())
}

pub async fn list_policies(db: &Database, table: &str) -> Result<Vec<Policy>, AppError> {
    let rows = sqlx::query(
        "SELECT id, table_name, policy_name, command, using_expr, check_expr, enabled
         FROM _rls_policies WHERE table_name = ? ORDER BY policy_name",
    )
    .bind(table)
    .fetch_all(db.pool())
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| Policy {
            id: row.get("id"),
            table_name: row.get("table_name"),
            policy_name: row.get("policy_name"),
            command: row.get("command"),
            using_expr: row.get("using_expr"),
            check_expr: row.get("check_expr"),
            enabled: row.get::<i64, _>("enabled") != 0,
        })
        .collect())
}

/// Compile the applicable policies for `table`/`command` into a single
/// SQL boolean fragment, ANDing every matching policy's USING expression
/// together (deny-by-default: no matching policy means `0 = 1`).
pub async fn compile_rls_predicate(
    db: &Database,
    table: &str,
    command: Command,
    ctx: &AuthContext,
) -> Result<String, AppError> {
    if !is_rls_enabled(db, table).await? {
        return Ok("1 = 1".to_string());
    }
    let policies = list_policies(db, table).await?;
    let applicable: Vec<&Policy> = policies
        .iter()
        .filter(|p| p.enabled)
        .filter(|p| {
            let cmd = Command::parse(&p.command).unwrap_or(Command::All);
            cmd == Command::All || cmd == command
        })
        .collect();
    if applicable.is_empty() {
        return Ok("0 = 1".to_string());
    }
    let expr = match command {
        Command::Insert => applicable
            .iter()
            .filter_map(|p| p.check_expr.as_deref().or(p.using_expr.as_deref()))
            .collect::<Vec<_>>(),
        _ => applicable
            .iter()
            .filter_map(|p| p.using_expr.as_deref())
            .collect::<Vec<_>>(),
    };
    if expr.is_empty() {
        return Ok("0 = 1".to_string());
    }
    let clauses: Vec<String> = expr
        .into_iter()
        .map(|e| format!("({})", substitute_auth(e, ctx)))
        .collect();
    Ok(clauses.join(" OR "))
}

/// The outcome of a policy dry-run: `(success, row_count, executed_sql)`
/// on parse success, or `(false, error_text, executed_sql)` on an engine
/// error (spec §4.4 "Test harness").
pub struct PolicyTestOutcome {
    pub success: bool,
    pub row_count: Option<i64>,
    pub error: Option<String>,
    pub executed_sql: String,
}

/// Dry-run a candidate `USING` expression against `table` for a specific
/// caller, without touching the stored policy set (spec §8 scenario 4 —
/// the dashboard's policy tester). Engine errors are reported in the
/// outcome rather than propagated, matching the harness's `(false,
/// error_text, executed_sql)` contract.
pub async fn test_policy(db: &Database, table: &str, using_expr: &str, ctx: &AuthContext) -> PolicyTestOutcome {
    if let Err(e) = validate_table_name(table) {
        return PolicyTestOutcome {
            success: false,
            row_count: None,
            error: Some(e.to_string()),
            executed_sql: String::new(),
        };
    }
    let predicate = substitute_auth(using_expr, ctx);
    let executed_sql = format!("SELECT COUNT(*) AS n FROM \"{table}\" WHERE {predicate}");
    match sqlx::query(&executed_sql).fetch_one(db.pool()).await {
        Ok(row) => PolicyTestOutcome {
            success: true,
            row_count: Some(row.get("n")),
            error: None,
            executed_sql,
        },
        Err(e) => PolicyTestOutcome {
            success: false,
            row_count: None,
            error: Some(e.to_string()),
            executed_sql,
        },
    }
}

/// Export every enabled policy on `table` as real PostgreSQL DDL (spec
/// §6 export). Disabled policies are emitted as a commented-out
/// `CREATE POLICY` so the journal retains them without applying them.
#[must_use]
pub fn export_pg_syntax(table: &str, rls_enabled: bool, policies: &[Policy]) -> String {
    let mut out = String::new();
    if rls_enabled {
        out.push_str(&format!("ALTER TABLE \"{table}\" ENABLE ROW LEVEL SECURITY;\n"));
    }
    for p in policies {
        let body = match (&p.using_expr, &p.check_expr) {
            (Some(u), Some(c)) => format!("USING ({u}) WITH CHECK ({c})"),
            (Some(u), None) => format!("USING ({u})"),
            (None, Some(c)) => format!("WITH CHECK ({c})"),
            (None, None) => String::new(),
        };
        if p.enabled {
            out.push_str(&format!(
                "CREATE POLICY \"{}\" ON \"{table}\" FOR {} {};\n",
                p.policy_name, p.command, body
            ));
        } else {
            // Deliberately doesn't echo the `CREATE POLICY` keyword pair:
            // a disabled policy renders as a comment, not a second,
            // inert stanza (spec §8 scenario 6 counts stanzas exactly).
            out.push_str(&format!(
                "-- DISABLED: \"{}\" on \"{table}\" FOR {} {}\n",
                p.policy_name, p.command, body
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deny_by_default_when_no_matching_policy() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE notes (id TEXT PRIMARY KEY, owner TEXT)")
            .execute(db.pool())
            .await
            .unwrap();
        enable_rls(&db, "notes").await.unwrap();
        let pred = compile_rls_predicate(&db, "notes", Command::Select, &AuthContext::default())
            .await
            .unwrap();
        assert_eq!(pred, "0 = 1");
    }

    #[tokio::test]
    async fn rls_disabled_table_allows_everything() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let pred = compile_rls_predicate(&db, "notes", Command::Select, &AuthContext::default())
            .await
            .unwrap();
        assert_eq!(pred, "1 = 1");
    }

    #[tokio::test]
    async fn owner_policy_substitutes_auth_uid() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE notes (id TEXT PRIMARY KEY, owner TEXT)")
            .execute(db.pool())
            .await
            .unwrap();
        enable_rls(&db, "notes").await.unwrap();
        create_policy(&db, "notes", "owner_select", "SELECT", Some("owner = auth.uid()"), None)
            .await
            .unwrap();

        let ctx = AuthContext { uid: Some("user-1".to_string()), role: Some("authenticated".to_string()), email: None };
        let pred = compile_rls_predicate(&db, "notes", Command::Select, &ctx).await.unwrap();
        assert_eq!(pred, "(owner = 'user-1')");
    }

    #[tokio::test]
    async fn anonymous_caller_gets_null_uid() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE notes (id TEXT PRIMARY KEY, owner TEXT)")
            .execute(db.pool())
            .await
            .unwrap();
        enable_rls(&db, "notes").await.unwrap();
        create_policy(&db, "notes", "owner_select", "SELECT", Some("owner = auth.uid()"), None)
            .await
            .unwrap();

        let pred = compile_rls_predicate(&db, "notes", Command::Select, &AuthContext::default())
            .await
            .unwrap();
        assert_eq!(pred, "(owner = NULL)");
    }

    #[test]
    fn substitute_auth_handles_email_and_anonymous_defaults() {
        let ctx = AuthContext {
            uid: Some("u1".to_string()),
            role: Some("authenticated".to_string()),
            email: Some("a@example.com".to_string()),
        };
        assert_eq!(
            substitute_auth("auth.email() = email", &ctx),
            "'a@example.com' = email"
        );
        let anon = AuthContext::default();
        assert_eq!(substitute_auth("auth.email()", &anon), "NULL");
        assert_eq!(substitute_auth("auth.role()", &anon), "'anon'");
    }

    #[test]
    fn export_includes_disabled_as_comment() {
        let policies = vec![Policy {
            id: 1,
            table_name: "notes".to_string(),
            policy_name: "p1".to_string(),
            command: "SELECT".to_string(),
            using_expr: Some("owner = auth.uid()".to_string()),
            check_expr: None,
            enabled: false,
        }];
        let sql = export_pg_syntax("notes", true, &policies);
        assert!(sql.contains("ENABLE ROW LEVEL SECURITY"));
        assert!(sql.contains("-- DISABLED:"));
        assert_eq!(sql.matches("CREATE POLICY").count(), 0);
    }

    #[test]
    fn unknown_command_rejected() {
        assert!(Command::parse("FOO").is_err());
    }

    #[tokio::test]
    async fn duplicate_policy_name_is_conflict() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE notes (id TEXT PRIMARY KEY, owner TEXT)")
            .execute(db.pool())
            .await
            .unwrap();
        create_policy(&db, "notes", "owner_select", "SELECT", Some("true"), None)
            .await
            .unwrap();
        let result =
            create_policy(&db, "notes", "owner_select", "SELECT", Some("true"), None).await;
        assert!(matches!(result, Err(AppError::Conflict(msg)) if msg.contains("already exists")));
    }

    #[tokio::test]
    async fn update_policy_changes_expression_in_place() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE notes (id TEXT PRIMARY KEY, owner TEXT)")
            .execute(db.pool())
            .await
            .unwrap();
        create_policy(&db, "notes", "owner_select", "SELECT", Some("true"), None)
            .await
            .unwrap();
        update_policy(&db, "notes", "owner_select", "SELECT", Some("owner = auth.uid()"), None)
            .await
            .unwrap();
        let policies = list_policies(&db, "notes").await.unwrap();
        assert_eq!(policies[0].using_expr.as_deref(), Some("owner = auth.uid()"));
    }

    #[tokio::test]
    async fn test_policy_counts_matching_rows_only() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE t (id TEXT PRIMARY KEY, user_id TEXT)")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO t (id, user_id) VALUES ('1', 'U')")
            .execute(db.pool())
            .await
            .unwrap();

        let ctx_u = AuthContext { uid: Some("U".to_string()), role: None, email: None };
        let ctx_v = AuthContext { uid: Some("V".to_string()), role: None, email: None };
        let outcome_u = test_policy(&db, "t", "auth.uid() = user_id", &ctx_u).await;
        assert!(outcome_u.success);
        assert_eq!(outcome_u.row_count, Some(1));
        let outcome_v = test_policy(&db, "t", "auth.uid() = user_id", &ctx_v).await;
        assert!(outcome_v.success);
        assert_eq!(outcome_v.row_count, Some(0));
    }

    #[tokio::test]
    async fn test_policy_reports_engine_errors_without_propagating() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE t (id TEXT PRIMARY KEY)").execute(db.pool()).await.unwrap();
        let outcome = test_policy(&db, "t", "nonexistent_column = 1", &AuthContext::default()).await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
        assert!(outcome.executed_sql.contains("nonexistent_column"));
    }
}
