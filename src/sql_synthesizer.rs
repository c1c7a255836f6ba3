//! SQL Synthesizer - Deterministic, allowlist-only SQL generation from an Intent
//!
//! Every statement this module emits is built exclusively from identifiers the
//! catalog knows, joined over at most one explicit foreign-key path. Anything
//! outside that envelope yields `SqlPlan::NoPlan` with the reason attached,
//! never a best guess.
//!
//! Output grammar:
//! `SELECT <cols> FROM <table> [JOIN <table> ON <eq-condition>] [WHERE <col> <op> <value>]`

use crate::catalog::{ForeignKey, SchemaCatalog};
use crate::error::Result;
use crate::intent::{Aggregation, Filter, Intent};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Optional collaborator answering "does any row of `table` have `column = value`?".
pub trait ValueProbe {
    fn exists(&self, table: &str, column: &str, value: &str) -> Result<bool>;
}

/// Why no plan could be produced.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SynthesisRejection {
    #[error("no table resolved")]
    NoTableResolved,

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("filter column {column} could not be resolved for value {value}")]
    UnresolvedFilterColumn { column: String, value: String },

    #[error("no join path between {0} and {1}")]
    NoJoinPath(String, String),

    #[error("ambiguous join path between {0} and {1} ({2} relations)")]
    AmbiguousJoinPath(String, String, usize),

    #[error("unsupported table count: {0}")]
    UnsupportedTableCount(usize),
}

/// Synthesizer output: SQL text or the explicit "no plan" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SqlPlan {
    Sql(String),
    NoPlan(SynthesisRejection),
}

impl SqlPlan {
    pub fn sql(&self) -> Option<&str> {
        match self {
            SqlPlan::Sql(sql) => Some(sql),
            SqlPlan::NoPlan(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&SynthesisRejection> {
        match self {
            SqlPlan::Sql(_) => None,
            SqlPlan::NoPlan(reason) => Some(reason),
        }
    }

    pub fn is_plan(&self) -> bool {
        matches!(self, SqlPlan::Sql(_))
    }
}

/// A filter bound to the table that owns its column.
#[derive(Debug, Clone)]
struct BoundFilter<'a> {
    table: &'a str,
    column: String,
    filter: &'a Filter,
}

impl BoundFilter<'_> {
    fn render(&self, qualify: bool) -> String {
        let column = if qualify {
            format!("{}.{}", self.table, self.column)
        } else {
            self.column.clone()
        };
        format!(
            "{} {} {}",
            column,
            self.filter.operator.as_str(),
            self.filter.value.to_sql()
        )
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SqlSynthesizer;

impl SqlSynthesizer {
    pub fn new() -> Self {
        Self
    }

    pub fn synthesize(
        &self,
        intent: &Intent,
        catalog: &SchemaCatalog,
        relations: &[ForeignKey],
        probe: Option<&dyn ValueProbe>,
    ) -> SqlPlan {
        match self.plan(intent, catalog, relations, probe) {
            Ok(sql) => {
                info!("Synthesized SQL: {}", sql);
                SqlPlan::Sql(sql)
            }
            Err(reason) => {
                info!("No plan: {}", reason);
                SqlPlan::NoPlan(reason)
            }
        }
    }

    fn plan(
        &self,
        intent: &Intent,
        catalog: &SchemaCatalog,
        relations: &[ForeignKey],
        probe: Option<&dyn ValueProbe>,
    ) -> std::result::Result<String, SynthesisRejection> {
        let referenced = intent.referenced_tables();
        if referenced.is_empty() {
            return Err(SynthesisRejection::NoTableResolved);
        }

        let tables = referenced
            .iter()
            .map(|t| {
                catalog
                    .canonical_table(t)
                    .ok_or_else(|| SynthesisRejection::UnknownTable(t.to_string()))
            })
            .collect::<std::result::Result<Vec<&str>, _>>()?;

        if tables.len() > 2 {
            return Err(SynthesisRejection::UnsupportedTableCount(tables.len()));
        }

        // (owning table, catalog spelling) per projected column
        let columns = intent
            .referenced_columns()
            .into_iter()
            .map(|c| {
                owner_of(catalog, &tables, c)
                    .ok_or_else(|| SynthesisRejection::UnknownColumn(c.to_string()))
            })
            .collect::<std::result::Result<Vec<(&str, String)>, _>>()?;

        let filter = match &intent.filter {
            Some(filter) => Some(self.bind_filter(filter, catalog, &tables, probe)?),
            None => None,
        };

        // Scalar aggregate target: the singular column when set, else the first.
        let agg_target = intent
            .column
            .as_deref()
            .and_then(|c| owner_of(catalog, &tables, c))
            .or_else(|| columns.first().cloned());

        match tables.as_slice() {
            [table] => Ok(render_single(
                table,
                intent.aggregation,
                agg_target.map(|(_, c)| c),
                &columns,
                filter.as_ref(),
            )),
            [left, right] => {
                let relation = join_relation(relations, left, right)?;
                Ok(render_join(
                    left,
                    right,
                    relation,
                    intent.aggregation,
                    agg_target,
                    &columns,
                    filter.as_ref(),
                ))
            }
            _ => Err(SynthesisRejection::UnsupportedTableCount(tables.len())),
        }
    }

    /// Bind the filter column to a referenced table, probing for the literal
    /// when the column is foreign to every referenced table.
    fn bind_filter<'a>(
        &self,
        filter: &'a Filter,
        catalog: &'a SchemaCatalog,
        tables: &[&'a str],
        probe: Option<&dyn ValueProbe>,
    ) -> std::result::Result<BoundFilter<'a>, SynthesisRejection> {
        if let Some((table, column)) = owner_of(catalog, tables, &filter.column) {
            return Ok(BoundFilter {
                table,
                column,
                filter,
            });
        }

        let unresolved = || SynthesisRejection::UnresolvedFilterColumn {
            column: filter.column.clone(),
            value: filter.value.raw().to_string(),
        };

        let Some(probe) = probe else {
            debug!("Filter column {} not in referenced tables and no probe available", filter.column);
            return Err(unresolved());
        };

        for &table in tables {
            let Some(schema) = catalog.table(table) else {
                continue;
            };
            for column in &schema.columns {
                match probe.exists(table, column, filter.value.raw()) {
                    Ok(true) => {
                        warn!(
                            "Auto-corrected filter column: {} -> {}.{}",
                            filter.column, table, column
                        );
                        return Ok(BoundFilter {
                            table,
                            column: column.clone(),
                            filter,
                        });
                    }
                    Ok(false) => {}
                    Err(e) => {
                        debug!("Value probe failed for {}.{}: {}", table, column, e);
                    }
                }
            }
        }

        Err(unresolved())
    }
}

/// First referenced table owning `column`, with the catalog spelling.
fn owner_of<'a>(
    catalog: &SchemaCatalog,
    tables: &[&'a str],
    column: &str,
) -> Option<(&'a str, String)> {
    tables.iter().find_map(|&table| {
        catalog
            .table(table)
            .and_then(|schema| schema.column(column))
            .map(|c| (table, c.to_string()))
    })
}

/// The single relation connecting the two tables. Several candidate paths
/// count as ambiguous.
fn join_relation<'r>(
    relations: &'r [ForeignKey],
    left: &str,
    right: &str,
) -> std::result::Result<&'r ForeignKey, SynthesisRejection> {
    let candidates: Vec<&ForeignKey> = relations
        .iter()
        .filter(|fk| fk.connects(left, right))
        .collect();

    match candidates.as_slice() {
        [relation] => Ok(relation),
        [] => Err(SynthesisRejection::NoJoinPath(
            left.to_string(),
            right.to_string(),
        )),
        many => Err(SynthesisRejection::AmbiguousJoinPath(
            left.to_string(),
            right.to_string(),
            many.len(),
        )),
    }
}

fn render_single(
    table: &str,
    aggregation: Option<Aggregation>,
    agg_target: Option<String>,
    columns: &[(&str, String)],
    filter: Option<&BoundFilter<'_>>,
) -> String {
    let projection = match (aggregation, agg_target) {
        (Some(agg), Some(column)) => format!("{}({})", agg.as_sql(), column),
        (Some(agg), None) => format!("{}(*)", agg.as_sql()),
        (None, _) if columns.is_empty() => "*".to_string(),
        (None, _) => columns
            .iter()
            .map(|(_, c)| c.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    };

    let mut sql = format!("SELECT {} FROM {}", projection, table);
    if let Some(filter) = filter {
        sql.push_str(&format!(" WHERE {}", filter.render(false)));
    }
    sql
}

fn render_join(
    left: &str,
    right: &str,
    relation: &ForeignKey,
    aggregation: Option<Aggregation>,
    agg_target: Option<(&str, String)>,
    columns: &[(&str, String)],
    filter: Option<&BoundFilter<'_>>,
) -> String {
    let projection = match (aggregation, agg_target) {
        (Some(agg), Some((table, column))) => format!("{}({}.{})", agg.as_sql(), table, column),
        (Some(agg), None) => format!("{}(*)", agg.as_sql()),
        (None, _) if columns.is_empty() => format!("{}.*, {}.*", left, right),
        (None, _) => columns
            .iter()
            .map(|(table, column)| format!("{}.{}", table, column))
            .collect::<Vec<_>>()
            .join(", "),
    };

    let on = if relation.from_table.eq_ignore_ascii_case(left) {
        format!(
            "{}.{} = {}.{}",
            left, relation.from_column, right, relation.to_column
        )
    } else {
        format!(
            "{}.{} = {}.{}",
            right, relation.from_column, left, relation.to_column
        )
    };

    let mut sql = format!(
        "SELECT {} FROM {} JOIN {} ON {}",
        projection, left, right, on
    );
    if let Some(filter) = filter {
        sql.push_str(&format!(" WHERE {}", filter.render(true)));
    }
    sql
}
