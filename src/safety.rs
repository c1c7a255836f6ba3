//! Safety Validator
//!
//! Re-derives the legality of a SQL string from its text and the catalog
//! alone. It never consults the synthesizer, so it applies equally to
//! synthesized SQL, repaired SQL and SQL handed in from outside.
//!
//! Checks run in a fixed order and the first violation wins:
//! 1. the "no plan" sentinel
//! 2. statement separators and comment markers
//! 3. leaked synthesis placeholders
//! 4. `FROM` / `JOIN` tables outside the catalog
//! 5. projected columns outside the union of schema columns
//! 6. missing `SELECT` or `FROM`
//! 7. parser cross-check of the statement shape, including the `WHERE`
//!    and `ON` predicates

use crate::catalog::{SchemaCatalog, TableSchema};
use crate::intent::Aggregation;
use crate::sql_synthesizer::SqlPlan;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use sqlparser::ast::{
    BinaryOperator, Expr, GroupByExpr, JoinConstraint, JoinOperator, Select, SetExpr, Statement,
    TableFactor, UnaryOperator, Value,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use thiserror::Error;
use tracing::{debug, warn};

lazy_static! {
    static ref LEAKED_PLACEHOLDER: Regex =
        Regex::new(r"(?i)\b(?:FROM|JOIN)\s+(?:NONE|NULL)\b|\{[^}]*\}").unwrap();
    static ref TABLE_REFERENCE: Regex =
        Regex::new(r#"(?i)\b(?:FROM|JOIN)\s+("[^"]+"|`[^`]+`|\[[^\]]+\]|[A-Za-z_][\w$]*)"#).unwrap();
    static ref PROJECTION: Regex = Regex::new(r"(?is)\bSELECT\s+(.*?)\s+FROM\b").unwrap();
    static ref DISTINCT_PREFIX: Regex = Regex::new(r"(?i)^DISTINCT\s+").unwrap();
    static ref ALIAS_SUFFIX: Regex = Regex::new(r"(?i)\s+AS\s+[A-Za-z_]\w*$").unwrap();
    static ref FUNCTION_CALL: Regex =
        Regex::new(r"(?is)^([A-Za-z_]\w*)\s*\(\s*(?:DISTINCT\s+)?(.*?)\s*\)$").unwrap();
    static ref SELECT_TOKEN: Regex = Regex::new(r"(?i)\bSELECT\b").unwrap();
    static ref FROM_TOKEN: Regex = Regex::new(r"(?i)\bFROM\b").unwrap();
}

/// Why the validator refused a statement.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SafetyRejection {
    #[error("no SQL to validate: {0}")]
    NoPlan(String),

    #[error("multiple statements are not allowed")]
    StatementSeparator,

    #[error("SQL comments are not allowed")]
    CommentMarker,

    #[error("unresolved placeholder in SQL: {0}")]
    LeakedPlaceholder(String),

    #[error("table not in schema: {0}")]
    UnknownTable(String),

    #[error("column not in schema: {0}")]
    UnknownColumn(String),

    #[error("query must contain SELECT and FROM")]
    NotSelect,

    #[error("unsupported statement: {0}")]
    UnsupportedStatement(String),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SafetyValidator;

impl SafetyValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a synthesizer output. The "no plan" sentinel is always rejected.
    pub fn validate_plan(
        &self,
        plan: &SqlPlan,
        catalog: &SchemaCatalog,
    ) -> Result<(), SafetyRejection> {
        match plan {
            SqlPlan::Sql(sql) => self.validate(sql, catalog),
            SqlPlan::NoPlan(reason) => Err(SafetyRejection::NoPlan(reason.to_string())),
        }
    }

    pub fn validate(&self, sql: &str, catalog: &SchemaCatalog) -> Result<(), SafetyRejection> {
        let result = self.check(sql, catalog);
        match &result {
            Ok(()) => debug!("SQL accepted: {}", sql),
            Err(reason) => warn!("SQL rejected ({}): {}", reason, sql),
        }
        result
    }

    fn check(&self, sql: &str, catalog: &SchemaCatalog) -> Result<(), SafetyRejection> {
        let trimmed = sql.trim();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("null")
            || trimmed.eq_ignore_ascii_case("none")
        {
            return Err(SafetyRejection::NoPlan("empty statement".to_string()));
        }

        if trimmed.contains(';') {
            return Err(SafetyRejection::StatementSeparator);
        }
        if trimmed.contains("--") || trimmed.contains("/*") {
            return Err(SafetyRejection::CommentMarker);
        }

        if let Some(m) = LEAKED_PLACEHOLDER.find(trimmed) {
            return Err(SafetyRejection::LeakedPlaceholder(m.as_str().to_string()));
        }

        for caps in TABLE_REFERENCE.captures_iter(trimmed) {
            let table = unquote(&caps[1]);
            if !catalog.contains_table(table) {
                return Err(SafetyRejection::UnknownTable(table.to_string()));
            }
        }

        for column in projected_columns(trimmed) {
            if !catalog.is_schema_column(&column) {
                return Err(SafetyRejection::UnknownColumn(column));
            }
        }

        if !SELECT_TOKEN.is_match(trimmed) || !FROM_TOKEN.is_match(trimmed) {
            return Err(SafetyRejection::NotSelect);
        }

        check_statement_shape(trimmed, catalog)
    }
}

fn unquote(identifier: &str) -> &str {
    identifier
        .trim_matches('"')
        .trim_matches('`')
        .trim_start_matches('[')
        .trim_end_matches(']')
}

/// Column identifiers of the projection clause, with aggregate arguments
/// unwrapped and table qualifiers stripped. `*` and empty items are skipped.
fn projected_columns(sql: &str) -> Vec<String> {
    let Some(caps) = PROJECTION.captures(sql) else {
        return Vec::new();
    };
    let clause = DISTINCT_PREFIX.replace(caps[1].trim(), "");

    split_top_level(&clause)
        .into_iter()
        .filter_map(|item| {
            let item = ALIAS_SUFFIX.replace(item.trim(), "").to_string();
            let inner = FUNCTION_CALL
                .captures(&item)
                .filter(|call| Aggregation::from_sql(&call[1]).is_some())
                .map(|call| call[2].to_string())
                .unwrap_or_else(|| item.clone());
            let column = inner.rsplit('.').next().unwrap_or_default();
            let column = unquote(column.trim());
            if column.is_empty() || column == "*" {
                None
            } else {
                Some(column.to_string())
            }
        })
        .collect()
}

/// Split on commas that are not nested in parentheses.
fn split_top_level(clause: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, ch) in clause.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(&clause[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    items.push(&clause[start..]);
    items
}

fn unsupported(what: impl Into<String>) -> SafetyRejection {
    SafetyRejection::UnsupportedStatement(what.into())
}

/// Exactly one plain `SELECT` over at most two tables.
fn check_statement_shape(sql: &str, catalog: &SchemaCatalog) -> Result<(), SafetyRejection> {
    if SELECT_TOKEN.find_iter(sql).count() > 1 {
        return Err(SafetyRejection::UnsupportedStatement(
            "nested SELECT".to_string(),
        ));
    }

    let statements = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|e| SafetyRejection::UnsupportedStatement(format!("parse error: {}", e)))?;

    let query = match statements.as_slice() {
        [Statement::Query(query)] => query,
        [_] => {
            return Err(SafetyRejection::UnsupportedStatement(
                "not a query".to_string(),
            ))
        }
        _ => {
            return Err(SafetyRejection::UnsupportedStatement(format!(
                "{} statements",
                statements.len()
            )))
        }
    };

    if query.with.is_some() {
        return Err(SafetyRejection::UnsupportedStatement(
            "common table expression".to_string(),
        ));
    }
    if !query.order_by.is_empty() || query.limit.is_some() || query.offset.is_some() {
        return Err(unsupported("ORDER BY, LIMIT or OFFSET"));
    }

    let select = match query.body.as_ref() {
        SetExpr::Select(select) => select,
        SetExpr::SetOperation { op, .. } => {
            return Err(SafetyRejection::UnsupportedStatement(format!(
                "set operation {}",
                op
            )))
        }
        other => {
            return Err(SafetyRejection::UnsupportedStatement(format!(
                "query body {}",
                other
            )))
        }
    };

    let [from] = select.from.as_slice() else {
        return Err(SafetyRejection::UnsupportedStatement(format!(
            "{} FROM items",
            select.from.len()
        )));
    };

    if from.joins.len() > 1 {
        return Err(SafetyRejection::UnsupportedStatement(format!(
            "{} joins",
            from.joins.len()
        )));
    }

    let scope = Scope::of(select, catalog)?;
    check_predicates(select, &scope)
}

/// Tables a statement reads, with the name or alias that qualifies them.
struct Scope<'a> {
    tables: Vec<(String, &'a TableSchema)>,
}

impl<'a> Scope<'a> {
    fn of(select: &Select, catalog: &'a SchemaCatalog) -> Result<Self, SafetyRejection> {
        let factors = select.from.iter().flat_map(|from| {
            std::iter::once(&from.relation).chain(from.joins.iter().map(|join| &join.relation))
        });

        let mut tables = Vec::new();
        for factor in factors {
            let TableFactor::Table {
                name, alias, args, ..
            } = factor
            else {
                return Err(unsupported("derived table"));
            };
            if args.is_some() {
                return Err(unsupported(format!("table function {}", name)));
            }
            let table_name = name.0.last().map(|ident| ident.value.as_str()).unwrap_or_default();
            let schema = catalog
                .table(table_name)
                .ok_or_else(|| SafetyRejection::UnknownTable(table_name.to_string()))?;
            let qualifier = alias
                .as_ref()
                .map(|alias| alias.name.value.clone())
                .unwrap_or_else(|| schema.name.clone());
            tables.push((qualifier, schema));
        }
        Ok(Self { tables })
    }

    /// Accept only a column of one of the statement's tables.
    fn column(&self, expr: &Expr) -> Result<(), SafetyRejection> {
        match expr {
            Expr::Identifier(column) => {
                if self.tables.iter().any(|(_, schema)| schema.has_column(&column.value)) {
                    Ok(())
                } else {
                    Err(SafetyRejection::UnknownColumn(column.value.clone()))
                }
            }
            Expr::CompoundIdentifier(parts) => {
                let [qualifier, column] = parts.as_slice() else {
                    return Err(unsupported(format!("identifier {}", expr)));
                };
                let (_, schema) = self
                    .tables
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(&qualifier.value))
                    .ok_or_else(|| SafetyRejection::UnknownTable(qualifier.value.clone()))?;
                if schema.has_column(&column.value) {
                    Ok(())
                } else {
                    Err(SafetyRejection::UnknownColumn(column.value.clone()))
                }
            }
            other => Err(unsupported(format!("expression {}", other))),
        }
    }
}

/// `WHERE` is a single `column =|>|< literal`, a join is `INNER ... ON
/// column = column`, and `GROUP BY` lists plain columns.
fn check_predicates(select: &Select, scope: &Scope<'_>) -> Result<(), SafetyRejection> {
    for join in select.from.iter().flat_map(|from| &from.joins) {
        let JoinOperator::Inner(JoinConstraint::On(condition)) = &join.join_operator else {
            return Err(unsupported("join without ON condition"));
        };
        let Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } = condition
        else {
            return Err(unsupported(format!("join condition {}", condition)));
        };
        scope.column(left)?;
        scope.column(right)?;
    }

    if let Some(filter) = &select.selection {
        let Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq | BinaryOperator::Gt | BinaryOperator::Lt,
            right,
        } = filter
        else {
            return Err(unsupported(format!("filter {}", filter)));
        };
        scope.column(left)?;
        if !is_literal(right) {
            return Err(unsupported(format!("filter value {}", right)));
        }
    }

    match &select.group_by {
        GroupByExpr::Expressions(columns) => {
            for column in columns {
                scope.column(column)?;
            }
        }
        GroupByExpr::All => return Err(unsupported("GROUP BY ALL")),
    }

    if let Some(having) = &select.having {
        return Err(unsupported(format!("HAVING {}", having)));
    }

    Ok(())
}

fn is_literal(expr: &Expr) -> bool {
    match expr {
        Expr::Value(Value::Number(..) | Value::SingleQuotedString(_)) => true,
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => matches!(expr.as_ref(), Expr::Value(Value::Number(..))),
        _ => false,
    }
}
