//! Intent types
//!
//! An `Intent` is created once per question by the extractor and is
//! read-only afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregation {
    Count,
    Avg,
    Max,
    Min,
    Sum,
}

impl Aggregation {
    pub const ALL: [Aggregation; 5] = [
        Aggregation::Count,
        Aggregation::Avg,
        Aggregation::Max,
        Aggregation::Min,
        Aggregation::Sum,
    ];

    pub fn as_sql(&self) -> &'static str {
        match self {
            Aggregation::Count => "COUNT",
            Aggregation::Avg => "AVG",
            Aggregation::Max => "MAX",
            Aggregation::Min => "MIN",
            Aggregation::Sum => "SUM",
        }
    }

    pub fn from_sql(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|agg| agg.as_sql().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Gt => ">",
            FilterOperator::Lt => "<",
        }
    }

    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "=" => Some(FilterOperator::Eq),
            ">" => Some(FilterOperator::Gt),
            "<" => Some(FilterOperator::Lt),
            _ => None,
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Literal on the right-hand side of a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    /// Rendered bare
    Number(String),
    /// Rendered single-quoted, original casing preserved
    Text(String),
}

impl Literal {
    /// Unquoted value, as handed to the value probe.
    pub fn raw(&self) -> &str {
        match self {
            Literal::Number(v) | Literal::Text(v) => v,
        }
    }

    pub fn to_sql(&self) -> String {
        match self {
            Literal::Number(v) => v.clone(),
            Literal::Text(v) => format!("'{}'", v.replace('\'', "''")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub operator: FilterOperator,
    pub value: Literal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalTag {
    LastMonth,
    LastYear,
    ThisMonth,
    ThisYear,
    LastWeek,
    Yesterday,
    Today,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparativeKind {
    GreaterThan,
    LessThan,
    Between,
    NotEqual,
}

/// Comparative phrase found in the question and the text that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparativeTag {
    pub kind: ComparativeKind,
    pub expression: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    RuleBased,
    SemanticAssisted,
}

/// Structured interpretation of a question against a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Set only when exactly one table was detected
    pub table: Option<String>,
    pub tables: Vec<String>,
    /// Set only when exactly one column was detected
    pub column: Option<String>,
    pub columns: Vec<String>,
    pub aggregation: Option<Aggregation>,
    pub filter: Option<Filter>,
    pub temporal: Option<TemporalTag>,
    pub comparative: Option<ComparativeTag>,
    pub confidence: f64,
    pub method: ExtractionMethod,
}

impl Intent {
    /// Tables the synthesizer should plan over.
    pub fn referenced_tables(&self) -> Vec<&str> {
        if !self.tables.is_empty() {
            self.tables.iter().map(String::as_str).collect()
        } else {
            self.table.iter().map(String::as_str).collect()
        }
    }

    /// Columns the synthesizer should project.
    pub fn referenced_columns(&self) -> Vec<&str> {
        if !self.columns.is_empty() {
            self.columns.iter().map(String::as_str).collect()
        } else {
            self.column.iter().map(String::as_str).collect()
        }
    }
}
