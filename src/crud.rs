//! PostgREST-style CRUD → SQL generator (spec §4.3).
//!
//! Filters are parsed into a closed, tagged representation
//! (spec.md §9 "Dynamic-field query objects... Filter{Op, Column, Value}")
//! and compiled to a parameterized statement; values are never interpolated
//! into SQL text.

use crate::db::ColumnValue;
use crate::error::AppError;
use std::collections::HashMap;

const DEFAULT_LIMIT: i64 = 25;
const MAX_LIMIT: i64 = 100;

/// Column/filter identifiers are interpolated directly into generated SQL
/// (values never are, see the module doc) so every one must be validated
/// against this shape before it reaches a query string.
fn validate_identifier(name: &str) -> Result<(), AppError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!("invalid column name: {name}")))
    }
}

/// A single comparison operator recognised in the filter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    IsNull,
    IsTrue,
    IsFalse,
}

/// One parsed filter condition: a column, an operator, and (for comparison
/// operators) a bind value.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Option<String>,
}

/// Sort direction for `order=col.desc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A parsed `order` parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

/// The fully parsed query-string parameters for a `GET /data/{table}` request.
#[derive(Debug, Clone, Default)]
pub struct SelectParams {
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub limit: i64,
    pub offset: i64,
}

/// A compiled `WHERE` fragment plus its positional bind list.
#[derive(Debug, Clone, Default)]
pub struct CompiledWhere {
    pub fragment: String,
    pub binds: Vec<String>,
}

fn parse_filter_value(raw: &str) -> Result<(FilterOp, Option<String>), AppError> {
    let (prefix, rest) = raw.split_once('.').ok_or_else(|| {
        AppError::Validation(format!("filter value missing operator prefix: {raw}"))
    })?;
    match prefix {
        "eq" => Ok((FilterOp::Eq, Some(rest.to_string()))),
        "neq" => Ok((FilterOp::Neq, Some(rest.to_string()))),
        "gt" => Ok((FilterOp::Gt, Some(rest.to_string()))),
        "gte" => Ok((FilterOp::Gte, Some(rest.to_string()))),
        "lt" => Ok((FilterOp::Lt, Some(rest.to_string()))),
        "lte" => Ok((FilterOp::Lte, Some(rest.to_string()))),
        "like" => Ok((FilterOp::Like, Some(rest.replace('*', "%")))),
        "ilike" => Ok((FilterOp::ILike, Some(rest.replace('*', "%")))),
        "is" => match rest {
            "null" => Ok((FilterOp::IsNull, None)),
            "true" => Ok((FilterOp::IsTrue, None)),
            "false" => Ok((FilterOp::IsFalse, None)),
            other => Err(AppError::Validation(format!("unsupported is.{other}"))),
        },
        other => Err(AppError::Validation(format!(
            "unsupported filter operator: {other}"
        ))),
    }
}

const RESERVED_PARAMS: &[&str] = &["limit", "offset", "order"];

/// Parse reserved params (`limit`, `offset`, `order`) and all remaining
/// query parameters as filters, honouring repeated keys as `AND`-joined
/// conditions (spec §4.3).
pub fn parse_select_params(params: &[(String, String)]) -> Result<SelectParams, AppError> {
    let mut out = SelectParams {
        limit: DEFAULT_LIMIT,
        ..Default::default()
    };

    for (key, value) in params {
        match key.as_str() {
            "limit" => {
                let requested: i64 = value
                    .parse()
                    .map_err(|_| AppError::Validation("limit must be an integer".to_string()))?;
                out.limit = requested.clamp(0, MAX_LIMIT);
            }
            "offset" => {
                out.offset = value
                    .parse()
                    .map_err(|_| AppError::Validation("offset must be an integer".to_string()))?;
            }
            "order" => {
                let (column, direction) = value.split_once('.').map_or(
                    (value.as_str(), SortDirection::Asc),
                    |(col, dir)| {
                        (
                            col,
                            if dir.eq_ignore_ascii_case("desc") {
                                SortDirection::Desc
                            } else {
                                SortDirection::Asc
                            },
                        )
                    },
                );
                validate_identifier(column)?;
                out.order = Some(OrderBy {
                    column: column.to_string(),
                    direction,
                });
            }
            _ if RESERVED_PARAMS.contains(&key.as_str()) => {}
            column => {
                validate_identifier(column)?;
                let (op, value) = parse_filter_value(value)?;
                out.filters.push(Filter {
                    column: column.to_string(),
                    op,
                    value,
                });
            }
        }
    }
    Ok(out)
}

/// Compile a set of filters into a `WHERE` fragment and positional binds.
/// An empty filter list compiles to an empty fragment ("no-op allowed" for
/// `UPDATE`, spec §4.3).
#[must_use]
pub fn compile_where(filters: &[Filter]) -> CompiledWhere {
    if filters.is_empty() {
        return CompiledWhere::default();
    }
    let mut clauses = Vec::new();
    let mut binds = Vec::new();
    for f in filters {
        let clause = match f.op {
            FilterOp::Eq => {
                binds.push(f.value.clone().unwrap_or_default());
                format!("{} = ?", f.column)
            }
            FilterOp::Neq => {
                binds.push(f.value.clone().unwrap_or_default());
                format!("{} != ?", f.column)
            }
            FilterOp::Gt => {
                binds.push(f.value.clone().unwrap_or_default());
                format!("{} > ?", f.column)
            }
            FilterOp::Gte => {
                binds.push(f.value.clone().unwrap_or_default());
                format!("{} >= ?", f.column)
            }
            FilterOp::Lt => {
                binds.push(f.value.clone().unwrap_or_default());
                format!("{} < ?", f.column)
            }
            FilterOp::Lte => {
                binds.push(f.value.clone().unwrap_or_default());
                format!("{} <= ?", f.column)
            }
            FilterOp::Like => {
                binds.push(f.value.clone().unwrap_or_default());
                format!("{} LIKE ?", f.column)
            }
            FilterOp::ILike => {
                binds.push(f.value.clone().unwrap_or_default());
                format!("{} LIKE ? COLLATE NOCASE", f.column)
            }
            FilterOp::IsNull => format!("{} IS NULL", f.column),
            FilterOp::IsTrue => format!("{} = 1", f.column),
            FilterOp::IsFalse => format!("{} = 0", f.column),
        };
        clauses.push(clause);
    }
    CompiledWhere {
        fragment: format!("WHERE {}", clauses.join(" AND ")),
        binds,
    }
}

/// Build the full `SELECT` statement (rows + a sibling count query sharing
/// the same `WHERE` fragment) for a table.
#[must_use]
pub fn build_select(table: &str, params: &SelectParams) -> (String, String, Vec<String>) {
    let compiled = compile_where(&params.filters);
    let order_sql = params.order.as_ref().map_or_else(String::new, |o| {
        let dir = match o.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        format!(" ORDER BY {} {dir}", o.column)
    });
    let select = format!(
        "SELECT * FROM {table} {} {order_sql} LIMIT {} OFFSET {}",
        compiled.fragment, params.limit, params.offset
    );
    let count = format!("SELECT COUNT(*) AS n FROM {table} {}", compiled.fragment);
    (select, count, compiled.binds)
}

/// Build a parameterized `INSERT` statement. Keys whose value is an empty
/// string against a column that has a non-empty catalog default are
/// dropped so the default applies (spec §4.3).
pub fn build_insert(
    table: &str,
    values: &HashMap<String, serde_json::Value>,
    defaults: &HashMap<String, Option<String>>,
) -> Result<(String, Vec<serde_json::Value>), AppError> {
    let mut columns = Vec::new();
    let mut binds = Vec::new();
    for (col, value) in values {
        validate_identifier(col)?;
        let is_empty_string = matches!(value, serde_json::Value::String(s) if s.is_empty());
        let has_default = defaults
            .get(col)
            .and_then(|d| d.as_ref())
            .is_some_and(|d| !d.is_empty());
        if is_empty_string && has_default {
            continue;
        }
        columns.push(col.clone());
        binds.push(value.clone());
    }
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    );
    Ok((sql, binds))
}

/// Build a parameterized `UPDATE` statement. An empty filter list is
/// accepted as a no-op update across the whole table (spec §4.3).
pub fn build_update(
    table: &str,
    values: &HashMap<String, serde_json::Value>,
    filters: &[Filter],
) -> Result<(String, Vec<serde_json::Value>, Vec<String>), AppError> {
    let mut set_clauses = Vec::new();
    let mut binds = Vec::new();
    for (col, value) in values {
        validate_identifier(col)?;
        set_clauses.push(format!("{col} = ?"));
        binds.push(value.clone());
    }
    let compiled = compile_where(filters);
    let sql = format!(
        "UPDATE {table} SET {} {}",
        set_clauses.join(", "),
        compiled.fragment
    );
    Ok((sql, binds, compiled.binds))
}

/// Build a parameterized `DELETE` statement. Returns `Err` if `filters` is
/// empty — deletes always require at least one filter (spec §4.3).
pub fn build_delete(table: &str, filters: &[Filter]) -> Result<(String, Vec<String>), AppError> {
    if filters.is_empty() {
        return Err(AppError::Validation(
            "DELETE requires at least one filter".to_string(),
        ));
    }
    let compiled = compile_where(filters);
    Ok((
        format!("DELETE FROM {table} {}", compiled.fragment),
        compiled.binds,
    ))
}

/// Render a decoded row as a JSON object, in column order.
#[must_use]
pub fn row_to_json(pairs: Vec<(String, ColumnValue)>) -> serde_json::Value {
    serde_json::Value::Object(
        pairs
            .into_iter()
            .map(|(name, value)| (name, value.to_json()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(key: &str, value: &str) -> (String, String) {
        (key.to_string(), value.to_string())
    }

    #[test]
    fn default_limit_and_offset() {
        let params = parse_select_params(&[]).unwrap();
        assert_eq!(params.limit, 25);
        assert_eq!(params.offset, 0);
    }

    #[test]
    fn limit_clamped_to_max() {
        let params = parse_select_params(&[p("limit", "500")]).unwrap();
        assert_eq!(params.limit, 100);
    }

    #[test]
    fn eq_filter_compiles() {
        let params = parse_select_params(&[p("name", "eq.alice")]).unwrap();
        let compiled = compile_where(&params.filters);
        assert_eq!(compiled.fragment, "WHERE name = ?");
        assert_eq!(compiled.binds, vec!["alice".to_string()]);
    }

    #[test]
    fn repeated_keys_are_and_joined_for_range() {
        let params =
            parse_select_params(&[p("x", "gt.5"), p("x", "lt.10")]).unwrap();
        let compiled = compile_where(&params.filters);
        assert_eq!(compiled.fragment, "WHERE x > ? AND x < ?");
        assert_eq!(compiled.binds, vec!["5".to_string(), "10".to_string()]);
    }

    #[test]
    fn is_null_and_booleans() {
        let params =
            parse_select_params(&[p("deleted_at", "is.null"), p("active", "is.true")]).unwrap();
        let compiled = compile_where(&params.filters);
        assert_eq!(compiled.fragment, "WHERE deleted_at IS NULL AND active = 1");
        assert!(compiled.binds.is_empty());
    }

    #[test]
    fn like_star_becomes_percent() {
        let params = parse_select_params(&[p("name", "like.a*b")]).unwrap();
        assert_eq!(params.filters[0].value.as_deref(), Some("a%b"));
    }

    #[test]
    fn order_desc() {
        let params = parse_select_params(&[p("order", "created_at.desc")]).unwrap();
        let order = params.order.unwrap();
        assert_eq!(order.column, "created_at");
        assert_eq!(order.direction, SortDirection::Desc);
    }

    #[test]
    fn delete_without_filter_is_rejected() {
        let result = build_delete("t", &[]);
        assert!(result.is_err());
    }

    #[test]
    fn delete_with_filter_builds_sql() {
        let filters = vec![Filter {
            column: "id".to_string(),
            op: FilterOp::Eq,
            value: Some("a".to_string()),
        }];
        let (sql, binds) = build_delete("t", &filters).unwrap();
        assert_eq!(sql, "DELETE FROM t WHERE id = ?");
        assert_eq!(binds, vec!["a".to_string()]);
    }

    #[test]
    fn insert_drops_empty_string_when_default_present() {
        let mut values = HashMap::new();
        values.insert("id".to_string(), serde_json::json!(""));
        values.insert("name".to_string(), serde_json::json!("x"));
        let mut defaults = HashMap::new();
        defaults.insert("id".to_string(), Some("gen_random_uuid()".to_string()));
        let (sql, binds) = build_insert("t", &values, &defaults).unwrap();
        assert!(!sql.contains("id"));
        assert_eq!(binds.len(), 1);
    }

    #[test]
    fn insert_rejects_invalid_column_name() {
        let mut values = HashMap::new();
        values.insert("name; DROP TABLE t --".to_string(), serde_json::json!("x"));
        assert!(build_insert("t", &values, &HashMap::new()).is_err());
    }

    #[test]
    fn update_with_no_filter_is_allowed() {
        let mut values = HashMap::new();
        values.insert("name".to_string(), serde_json::json!("x"));
        let (sql, binds, where_binds) = build_update("t", &values, &[]).unwrap();
        assert_eq!(sql, "UPDATE t SET name = ? ");
        assert_eq!(binds.len(), 1);
        assert!(where_binds.is_empty());
    }
}
