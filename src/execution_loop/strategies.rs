//! Repair strategies
//!
//! Each strategy looks at the failing SQL and the execution error and either
//! proposes a new SQL text or declines. The reflex loop tries them in
//! priority order and keeps the first proposal that changes the text.

use super::error_classifier::ErrorClassifier;
use super::history::{error_signature, CorrectionHistory};
use super::similarity::{IdentifierKind, SimilarityMatcher};
use crate::catalog::SchemaCatalog;
use crate::execution::{ExecutionError, ExecutionErrorKind};
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use tracing::debug;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[A-Za-z_][A-Za-z0-9_$]*").unwrap();
    static ref STRING_LITERAL: Regex = Regex::new(r"'(?:[^']|'')*'").unwrap();
    static ref PROJECTION: Regex = Regex::new(r"(?is)^\s*SELECT\s+(.*?)\s+FROM\b").unwrap();
    static ref AGGREGATE_CALL: Regex =
        Regex::new(r"(?i)^(?:COUNT|SUM|AVG|MAX|MIN)\s*\(").unwrap();
    static ref BARE_COLUMN: Regex =
        Regex::new(r"^[A-Za-z_]\w*(?:\.[A-Za-z_]\w*)?$").unwrap();
    static ref GROUP_BY: Regex = Regex::new(r"(?i)\bGROUP\s+BY\b").unwrap();
    static ref COUNT_STAR: Regex = Regex::new(r"(?i)\bCOUNT\s*\(\s*\*\s*\)").unwrap();
    static ref AVG_CALL: Regex = Regex::new(r"(?i)\bAVG\s*\(").unwrap();
    static ref JOIN_TOKEN: Regex = Regex::new(r"(?i)\bJOIN\b").unwrap();
}

const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "JOIN", "INNER", "LEFT", "RIGHT", "OUTER", "CROSS", "ON", "WHERE", "AND",
    "OR", "NOT", "AS", "DISTINCT", "GROUP", "BY", "ORDER", "ASC", "DESC", "LIMIT", "OFFSET",
    "HAVING", "COUNT", "SUM", "AVG", "MAX", "MIN", "NULL", "IS", "IN", "LIKE", "BETWEEN",
    "TRUE", "FALSE", "CASE", "WHEN", "THEN", "ELSE", "END",
];

fn is_keyword(word: &str) -> bool {
    SQL_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    PatternBased,
    SchemaBased,
    LearningBased,
    Fallback,
}

impl StrategyKind {
    pub fn base_confidence(&self) -> f64 {
        match self {
            StrategyKind::PatternBased => 0.8,
            StrategyKind::SchemaBased => 0.9,
            StrategyKind::LearningBased => 0.7,
            StrategyKind::Fallback => 0.6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::PatternBased => "pattern_based",
            StrategyKind::SchemaBased => "schema_based",
            StrategyKind::LearningBased => "learning_based",
            StrategyKind::Fallback => "fallback",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed rewrite and the corrections it is made of.
#[derive(Debug, Clone, PartialEq)]
pub struct Repair {
    pub sql: String,
    pub corrections: Vec<String>,
}

/// Read-only inputs shared by all strategies during one attempt.
pub struct RepairContext<'a> {
    pub catalog: &'a SchemaCatalog,
    pub history: &'a CorrectionHistory,
}

pub trait RepairStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// `None` when the strategy has nothing to offer for this error.
    fn attempt(&self, sql: &str, error: &ExecutionError, ctx: &RepairContext<'_>)
        -> Option<Repair>;
}

/// The four strategies in priority order.
pub fn default_strategies() -> Vec<Box<dyn RepairStrategy>> {
    vec![
        Box::new(PatternBasedStrategy::default()),
        Box::new(SchemaBasedStrategy::default()),
        Box::new(LearningBasedStrategy),
        Box::new(FallbackStrategy),
    ]
}

/// Identifier token outside string literals.
#[derive(Debug, Clone)]
struct Ident<'a> {
    span: Range<usize>,
    text: &'a str,
    /// `x` in `t.x`
    qualified: bool,
    /// `t` in `t.x`
    qualifier: bool,
    /// directly after `FROM` / `JOIN`
    table_position: bool,
    /// directly after `=`
    after_equals: bool,
}

impl Ident<'_> {
    fn is_bare(&self) -> bool {
        !self.qualified && !self.qualifier && !self.table_position
    }
}

fn identifiers(sql: &str) -> Vec<Ident<'_>> {
    let literals: Vec<Range<usize>> = STRING_LITERAL.find_iter(sql).map(|m| m.range()).collect();

    let mut idents = Vec::new();
    let mut prev: Option<(&str, usize)> = None;
    for m in WORD.find_iter(sql) {
        if literals.iter().any(|r| r.contains(&m.start())) {
            continue;
        }
        // tail of a numeric literal such as `1e5`
        if sql[..m.start()].ends_with(|c: char| c.is_ascii_digit()) {
            continue;
        }

        let before = sql[..m.start()].trim_end();
        let table_position = prev.map_or(false, |(word, end)| {
            (word.eq_ignore_ascii_case("FROM") || word.eq_ignore_ascii_case("JOIN"))
                && sql[end..m.start()].trim().is_empty()
        });

        idents.push(Ident {
            span: m.range(),
            text: m.as_str(),
            qualified: before.ends_with('.'),
            qualifier: sql[m.end()..].starts_with('.'),
            table_position,
            after_equals: before.ends_with('='),
        });
        prev = Some((m.as_str(), m.end()));
    }
    idents
}

/// Apply non-overlapping edits.
fn apply_edits(sql: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by_key(|(span, _)| std::cmp::Reverse(span.start));
    let mut out = sql.to_string();
    for (span, replacement) in edits {
        out.replace_range(span, &replacement);
    }
    out
}

/// Tables named after `FROM` / `JOIN`, in order of appearance.
fn query_tables(sql: &str) -> Vec<&str> {
    identifiers(sql)
        .into_iter()
        .filter(|ident| ident.table_position)
        .map(|ident| ident.text)
        .collect()
}

fn table_set(sql: &str) -> BTreeSet<String> {
    query_tables(sql)
        .into_iter()
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Columns of the query's own tables first, then the rest of the catalog.
fn column_candidates<'c>(sql: &str, catalog: &'c SchemaCatalog) -> Vec<&'c str> {
    query_tables(sql)
        .into_iter()
        .filter_map(|table| catalog.columns(table))
        .flatten()
        .chain(catalog.all_columns())
        .map(String::as_str)
        .unique_by(|c| c.to_ascii_lowercase())
        .collect()
}

/// First query table owning `column`.
fn owning_table<'s>(sql: &'s str, column: &str, catalog: &SchemaCatalog) -> Option<&'s str> {
    query_tables(sql)
        .into_iter()
        .find(|table| catalog.has_column(table, column))
}

/// Projection items and the byte span of the projection clause.
fn projection(sql: &str) -> Option<(Range<usize>, Vec<String>)> {
    let clause = PROJECTION.captures(sql)?.get(1)?;
    let items = clause
        .as_str()
        .split(',')
        .map(|item| item.trim().to_string())
        .collect();
    Some((clause.range(), items))
}

fn bare_projection_columns(items: &[String]) -> Vec<String> {
    items
        .iter()
        .filter(|item| BARE_COLUMN.is_match(item) && !is_keyword(item))
        .cloned()
        .collect()
}

/// Targeted rewrites keyed on the classified error.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternBasedStrategy {
    matcher: SimilarityMatcher,
}

impl PatternBasedStrategy {
    fn replace_table(&self, sql: &str, invalid: &str, catalog: &SchemaCatalog) -> Option<Repair> {
        let invalid = invalid.rsplit('.').next().unwrap_or(invalid);
        let tables = catalog.tables();
        let suggestion = self.matcher.suggest(invalid, &tables, IdentifierKind::Table)?;
        if suggestion.eq_ignore_ascii_case(invalid) {
            return None;
        }

        let edits: Vec<_> = identifiers(sql)
            .into_iter()
            .filter(|ident| !ident.qualified && ident.text.eq_ignore_ascii_case(invalid))
            .map(|ident| (ident.span, suggestion.to_string()))
            .collect();
        if edits.is_empty() {
            return None;
        }

        Some(Repair {
            sql: apply_edits(sql, edits),
            corrections: vec![format!("Table '{}' -> '{}'", invalid, suggestion)],
        })
    }

    fn replace_column(&self, sql: &str, invalid: &str, catalog: &SchemaCatalog) -> Option<Repair> {
        let invalid = invalid.rsplit('.').next().unwrap_or(invalid);
        let candidates = column_candidates(sql, catalog);
        let suggestion = self
            .matcher
            .suggest(invalid, &candidates, IdentifierKind::Column)?;
        if suggestion.eq_ignore_ascii_case(invalid) {
            return None;
        }

        let edits: Vec<_> = identifiers(sql)
            .into_iter()
            .filter(|ident| {
                !ident.qualifier && !ident.table_position && ident.text.eq_ignore_ascii_case(invalid)
            })
            .map(|ident| (ident.span, suggestion.to_string()))
            .collect();
        if edits.is_empty() {
            return None;
        }

        Some(Repair {
            sql: apply_edits(sql, edits),
            corrections: vec![format!("Column '{}' -> '{}'", invalid, suggestion)],
        })
    }

    fn qualify_column(&self, sql: &str, column: &str, catalog: &SchemaCatalog) -> Option<Repair> {
        let column = column.rsplit('.').next().unwrap_or(column);
        let table = owning_table(sql, column, catalog)?;

        let edits: Vec<_> = identifiers(sql)
            .into_iter()
            .filter(|ident| ident.is_bare() && ident.text.eq_ignore_ascii_case(column))
            .map(|ident| (ident.span, format!("{}.{}", table, ident.text)))
            .collect();
        if edits.is_empty() {
            return None;
        }

        Some(Repair {
            sql: apply_edits(sql, edits),
            corrections: vec![format!("Qualified column: {} -> {}.{}", column, table, column)],
        })
    }

    fn patch_syntax(&self, sql: &str) -> Option<Repair> {
        let (span, items) = projection(sql)?;
        let mut corrections = Vec::new();

        // `SELECT a b FROM` -> `SELECT a, b FROM`
        let mut fixed_items = Vec::with_capacity(items.len());
        for item in &items {
            let words: Vec<&str> = item.split_whitespace().collect();
            if words.len() > 1 && words.iter().all(|w| BARE_COLUMN.is_match(w) && !is_keyword(w)) {
                corrections.push("Added missing comma in SELECT list".to_string());
                fixed_items.extend(words.into_iter().map(str::to_string));
            } else {
                fixed_items.push(item.clone());
            }
        }

        let mut repaired = sql.to_string();
        if !corrections.is_empty() {
            repaired = apply_edits(sql, vec![(span, fixed_items.join(", "))]);
        }

        // aggregate mixed with bare columns needs a GROUP BY
        let has_aggregate = fixed_items.iter().any(|item| AGGREGATE_CALL.is_match(item));
        let bare = bare_projection_columns(&fixed_items);
        if has_aggregate && !bare.is_empty() && !GROUP_BY.is_match(&repaired) {
            repaired.push_str(&format!(" GROUP BY {}", bare.join(", ")));
            corrections.push(format!("Added GROUP BY {}", bare.join(", ")));
        }

        (!corrections.is_empty()).then_some(Repair {
            sql: repaired,
            corrections,
        })
    }
}

impl RepairStrategy for PatternBasedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PatternBased
    }

    fn attempt(
        &self,
        sql: &str,
        error: &ExecutionError,
        ctx: &RepairContext<'_>,
    ) -> Option<Repair> {
        let offending = ErrorClassifier::new().offending_identifier(&error.message);
        match error.kind {
            ExecutionErrorKind::UnknownTable => self.replace_table(sql, &offending?, ctx.catalog),
            ExecutionErrorKind::UnknownColumn => {
                self.replace_column(sql, &offending?, ctx.catalog)
            }
            ExecutionErrorKind::AmbiguousColumn => {
                self.qualify_column(sql, &offending?, ctx.catalog)
            }
            ExecutionErrorKind::SyntaxError => self.patch_syntax(sql),
            ExecutionErrorKind::Timeout | ExecutionErrorKind::Other => None,
        }
    }
}

/// Replaces every identifier the catalog does not know, whatever the error said.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaBasedStrategy {
    matcher: SimilarityMatcher,
}

impl RepairStrategy for SchemaBasedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SchemaBased
    }

    fn attempt(
        &self,
        sql: &str,
        _error: &ExecutionError,
        ctx: &RepairContext<'_>,
    ) -> Option<Repair> {
        let catalog = ctx.catalog;
        let tables = catalog.tables();
        let columns: Vec<&str> = catalog.all_columns().iter().map(String::as_str).collect();

        let mut edits = Vec::new();
        let mut corrections = Vec::new();
        for ident in identifiers(sql) {
            if is_keyword(ident.text) || catalog.is_known_identifier(ident.text) {
                continue;
            }

            let (candidates, label) = if ident.table_position || ident.qualifier {
                (&tables, "Table")
            } else {
                (&columns, "Column")
            };
            let Some(suggestion) = self.matcher.closest(ident.text, candidates) else {
                debug!("No schema match for identifier {}", ident.text);
                continue;
            };

            let correction = format!(
                "{} '{}' -> '{}' (schema match)",
                label, ident.text, suggestion
            );
            if !corrections.contains(&correction) {
                corrections.push(correction);
            }
            edits.push((ident.span, suggestion.to_string()));
        }

        if edits.is_empty() {
            return None;
        }
        Some(Repair {
            sql: apply_edits(sql, edits),
            corrections,
        })
    }
}

/// Replays the latest successful correction recorded for the same error
/// signature over the same set of tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct LearningBasedStrategy;

impl RepairStrategy for LearningBasedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LearningBased
    }

    fn attempt(
        &self,
        sql: &str,
        error: &ExecutionError,
        ctx: &RepairContext<'_>,
    ) -> Option<Repair> {
        if !ctx.history.learning_enabled() {
            return None;
        }

        let signature = error_signature(&error.message);
        let tables = table_set(sql);
        let record = ctx.history.latest_success(&signature, |record| {
            record
                .corrected_sql
                .as_deref()
                .map_or(false, |corrected| table_set(corrected) == tables)
        })?;

        let corrected = record.corrected_sql?;
        Some(Repair {
            sql: corrected,
            corrections: vec![format!(
                "Applied learned correction from {}",
                record.timestamp.to_rfc3339()
            )],
        })
    }
}

/// Last-resort heuristics.
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackStrategy;

impl FallbackStrategy {
    /// `col = CIS` -> `col = 'CIS'`
    fn quote_literals(
        &self,
        idents: &[Ident<'_>],
        catalog: &SchemaCatalog,
        edits: &mut Vec<(Range<usize>, String)>,
        corrections: &mut Vec<String>,
    ) {
        for ident in idents.iter().filter(|i| i.after_equals && !i.qualifier) {
            if is_keyword(ident.text) || catalog.is_known_identifier(ident.text) {
                continue;
            }
            if !ident.text.chars().all(|c| c.is_ascii_alphabetic()) {
                continue;
            }
            edits.push((ident.span.clone(), format!("'{}'", ident.text)));
            corrections.push(format!("Added quotes to '{}'", ident.text));
        }
    }

    /// Prefix bare join columns with the first query table that owns them.
    fn qualify_join_columns(
        &self,
        sql: &str,
        idents: &[Ident<'_>],
        catalog: &SchemaCatalog,
        edits: &mut Vec<(Range<usize>, String)>,
        corrections: &mut Vec<String>,
    ) {
        for ident in idents.iter().filter(|i| i.is_bare() && !is_keyword(i.text)) {
            if let Some(table) = owning_table(sql, ident.text, catalog) {
                edits.push((ident.span.clone(), format!("{}.{}", table, ident.text)));
                corrections.push(format!(
                    "Qualified column '{}' with table '{}'",
                    ident.text, table
                ));
            }
        }
    }

    fn fix_aggregates(&self, sql: &str, corrections: &mut Vec<String>) -> String {
        let Some((_, items)) = projection(sql) else {
            return sql.to_string();
        };
        let bare = bare_projection_columns(&items);
        let Some(first_bare) = bare.first() else {
            return sql.to_string();
        };

        if GROUP_BY.is_match(sql) && COUNT_STAR.is_match(sql) {
            corrections.push(format!("Changed COUNT(*) to COUNT({})", first_bare));
            return COUNT_STAR
                .replace(sql, format!("COUNT({})", first_bare).as_str())
                .into_owned();
        }

        if !GROUP_BY.is_match(sql) && AVG_CALL.is_match(sql) {
            corrections.push(format!(
                "Added GROUP BY {} for AVG function",
                first_bare
            ));
            return format!("{} GROUP BY {}", sql, first_bare);
        }

        sql.to_string()
    }
}

impl RepairStrategy for FallbackStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Fallback
    }

    fn attempt(
        &self,
        sql: &str,
        error: &ExecutionError,
        ctx: &RepairContext<'_>,
    ) -> Option<Repair> {
        let message = error.message.to_lowercase();
        let idents = identifiers(sql);
        let mut edits = Vec::new();
        let mut corrections = Vec::new();

        self.quote_literals(&idents, ctx.catalog, &mut edits, &mut corrections);

        if (error.kind == ExecutionErrorKind::AmbiguousColumn || message.contains("ambiguous"))
            && JOIN_TOKEN.is_match(sql)
        {
            let quoted: Vec<usize> = edits.iter().map(|(span, _)| span.start).collect();
            let remaining: Vec<Ident<'_>> = idents
                .iter()
                .filter(|i| !quoted.contains(&i.span.start))
                .cloned()
                .collect();
            self.qualify_join_columns(sql, &remaining, ctx.catalog, &mut edits, &mut corrections);
        }

        let mut repaired = apply_edits(sql, edits);

        if message.contains("aggregate") {
            repaired = self.fix_aggregates(&repaired, &mut corrections);
        }

        (!corrections.is_empty() && repaired != sql).then_some(Repair {
            sql: repaired,
            corrections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{fixtures, TableSchema};
    use crate::execution_loop::history::CorrectionRecord;

    fn scores_catalog() -> SchemaCatalog {
        SchemaCatalog::new(
            vec![TableSchema::new("STUDENT", &["id", "name", "marks"])],
            vec![],
        )
        .unwrap()
    }

    fn error(kind: ExecutionErrorKind, message: &str) -> ExecutionError {
        ExecutionError::new(kind, message)
    }

    #[test]
    fn test_identifiers_skip_literals_and_flag_positions() {
        let idents = identifiers("SELECT s.name FROM STUDENT WHERE name = 'from x' AND id = abc");
        let texts: Vec<&str> = idents.iter().map(|i| i.text).collect();
        assert_eq!(
            texts,
            vec!["SELECT", "s", "name", "FROM", "STUDENT", "WHERE", "name", "AND", "id", "abc"]
        );
        assert!(idents[1].qualifier);
        assert!(idents[2].qualified);
        assert!(idents[4].table_position);
        assert!(idents[9].after_equals);
    }

    #[test]
    fn test_pattern_maps_synonym_column() {
        let catalog = scores_catalog();
        let history = CorrectionHistory::default();
        let ctx = RepairContext {
            catalog: &catalog,
            history: &history,
        };
        let repair = PatternBasedStrategy::default()
            .attempt(
                "SELECT name FROM STUDENT WHERE score > 50",
                &error(ExecutionErrorKind::UnknownColumn, "no such column: score"),
                &ctx,
            )
            .unwrap();
        assert_eq!(repair.sql, "SELECT name FROM STUDENT WHERE marks > 50");
        assert_eq!(repair.corrections, vec!["Column 'score' -> 'marks'"]);
    }

    #[test]
    fn test_pattern_replaces_table() {
        let catalog = fixtures::university();
        let history = CorrectionHistory::default();
        let ctx = RepairContext {
            catalog: &catalog,
            history: &history,
        };
        let repair = PatternBasedStrategy::default()
            .attempt(
                "SELECT STU_FNAME FROM STUDENTS",
                &error(ExecutionErrorKind::UnknownTable, "no such table: STUDENTS"),
                &ctx,
            )
            .unwrap();
        assert_eq!(repair.sql, "SELECT STU_FNAME FROM STUDENT");
    }

    #[test]
    fn test_pattern_qualifies_ambiguous_column() {
        let catalog = fixtures::university();
        let history = CorrectionHistory::default();
        let ctx = RepairContext {
            catalog: &catalog,
            history: &history,
        };
        let repair = PatternBasedStrategy::default()
            .attempt(
                "SELECT DEPT_CODE FROM STUDENT JOIN DEPARTMENT ON STUDENT.DEPT_CODE = DEPARTMENT.DEPT_CODE",
                &error(
                    ExecutionErrorKind::AmbiguousColumn,
                    "ambiguous column name: DEPT_CODE",
                ),
                &ctx,
            )
            .unwrap();
        assert_eq!(
            repair.sql,
            "SELECT STUDENT.DEPT_CODE FROM STUDENT JOIN DEPARTMENT ON STUDENT.DEPT_CODE = DEPARTMENT.DEPT_CODE"
        );
    }

    #[test]
    fn test_pattern_syntax_patches() {
        let catalog = fixtures::university();
        let history = CorrectionHistory::default();
        let ctx = RepairContext {
            catalog: &catalog,
            history: &history,
        };
        let strategy = PatternBasedStrategy::default();
        let syntax = error(ExecutionErrorKind::SyntaxError, "near \"STU_GPA\": syntax error");

        let repair = strategy
            .attempt("SELECT STU_FNAME STU_GPA FROM STUDENT", &syntax, &ctx)
            .unwrap();
        assert_eq!(repair.sql, "SELECT STU_FNAME, STU_GPA FROM STUDENT");

        let repair = strategy
            .attempt("SELECT DEPT_CODE, COUNT(*) FROM STUDENT", &syntax, &ctx)
            .unwrap();
        assert_eq!(
            repair.sql,
            "SELECT DEPT_CODE, COUNT(*) FROM STUDENT GROUP BY DEPT_CODE"
        );

        assert!(strategy
            .attempt("SELECT STU_FNAME FROM STUDENT", &syntax, &ctx)
            .is_none());
    }

    #[test]
    fn test_pattern_declines_timeouts() {
        let catalog = fixtures::university();
        let history = CorrectionHistory::default();
        let ctx = RepairContext {
            catalog: &catalog,
            history: &history,
        };
        assert!(PatternBasedStrategy::default()
            .attempt(
                "SELECT * FROM STUDENT",
                &error(ExecutionErrorKind::Timeout, "interrupted"),
                &ctx
            )
            .is_none());
    }

    #[test]
    fn test_schema_based_replaces_unknown_identifiers() {
        let catalog = fixtures::university();
        let history = CorrectionHistory::default();
        let ctx = RepairContext {
            catalog: &catalog,
            history: &history,
        };
        let repair = SchemaBasedStrategy::default()
            .attempt(
                "SELECT stu_fnam FROM STUDNT WHERE STU_GPZ > 3",
                &error(ExecutionErrorKind::Other, "boom"),
                &ctx,
            )
            .unwrap();
        assert_eq!(
            repair.sql,
            "SELECT STU_FNAME FROM STUDENT WHERE STU_GPA > 3"
        );
        assert_eq!(repair.corrections.len(), 3);
    }

    #[test]
    fn test_learning_replays_matching_signature() {
        let catalog = scores_catalog();
        let history = CorrectionHistory::default();
        let mut record = CorrectionRecord::new(
            "SELECT rating FROM STUDENT",
            error_signature("no such column: rating"),
        );
        record.corrected_sql = Some("SELECT marks FROM STUDENT".to_string());
        record.strategy = Some(StrategyKind::PatternBased);
        record.succeeded = true;
        history.append(record);

        let ctx = RepairContext {
            catalog: &catalog,
            history: &history,
        };
        let failing = error(ExecutionErrorKind::UnknownColumn, "no such column: grade");

        let repair = LearningBasedStrategy
            .attempt("SELECT grade FROM STUDENT", &failing, &ctx)
            .unwrap();
        assert_eq!(repair.sql, "SELECT marks FROM STUDENT");

        // different tables, no replay
        assert!(LearningBasedStrategy
            .attempt("SELECT grade FROM COURSE", &failing, &ctx)
            .is_none());

        history.set_learning_enabled(false);
        assert!(LearningBasedStrategy
            .attempt("SELECT grade FROM STUDENT", &failing, &ctx)
            .is_none());
    }

    #[test]
    fn test_fallback_quotes_bare_literal() {
        let catalog = fixtures::university();
        let history = CorrectionHistory::default();
        let ctx = RepairContext {
            catalog: &catalog,
            history: &history,
        };
        let repair = FallbackStrategy
            .attempt(
                "SELECT STU_FNAME FROM STUDENT WHERE DEPT_CODE = CIS",
                &error(ExecutionErrorKind::UnknownColumn, "no such column: CIS"),
                &ctx,
            )
            .unwrap();
        assert_eq!(
            repair.sql,
            "SELECT STU_FNAME FROM STUDENT WHERE DEPT_CODE = 'CIS'"
        );
    }

    #[test]
    fn test_fallback_fixes_count_under_group_by() {
        let catalog = fixtures::university();
        let history = CorrectionHistory::default();
        let ctx = RepairContext {
            catalog: &catalog,
            history: &history,
        };
        let repair = FallbackStrategy
            .attempt(
                "SELECT DEPT_CODE, COUNT(*) FROM STUDENT GROUP BY DEPT_CODE",
                &error(ExecutionErrorKind::SyntaxError, "misuse of aggregate: COUNT()"),
                &ctx,
            )
            .unwrap();
        assert_eq!(
            repair.sql,
            "SELECT DEPT_CODE, COUNT(DEPT_CODE) FROM STUDENT GROUP BY DEPT_CODE"
        );
    }

    #[test]
    fn test_confidence_bases() {
        assert_eq!(StrategyKind::PatternBased.base_confidence(), 0.8);
        assert_eq!(StrategyKind::SchemaBased.base_confidence(), 0.9);
        assert_eq!(StrategyKind::LearningBased.base_confidence(), 0.7);
        assert_eq!(StrategyKind::Fallback.base_confidence(), 0.6);
    }
}
