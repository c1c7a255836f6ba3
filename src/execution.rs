//! Execution collaborator contract
//!
//! The pipeline never talks to a database directly. It hands validated SQL
//! to a `QueryExecutor` and receives either rows or a typed, bounded error.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    UnknownTable,
    UnknownColumn,
    AmbiguousColumn,
    SyntaxError,
    Timeout,
    Other,
}

impl ExecutionErrorKind {
    /// Identifier and syntax errors are retried by the repair loop; timeouts
    /// and everything else are surfaced unchanged.
    pub fn is_repairable(&self) -> bool {
        matches!(
            self,
            ExecutionErrorKind::UnknownTable
                | ExecutionErrorKind::UnknownColumn
                | ExecutionErrorKind::AmbiguousColumn
                | ExecutionErrorKind::SyntaxError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionErrorKind::UnknownTable => "unknown_table",
            ExecutionErrorKind::UnknownColumn => "unknown_column",
            ExecutionErrorKind::AmbiguousColumn => "ambiguous_column",
            ExecutionErrorKind::SyntaxError => "syntax_error",
            ExecutionErrorKind::Timeout => "timeout",
            ExecutionErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned by an execution collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
}

impl ExecutionError {
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_repairable(&self) -> bool {
        self.kind.is_repairable()
    }
}

/// Result set of a successful execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Runs one SELECT statement. Implementations enforce their own timeout.
pub trait QueryExecutor {
    fn run(&self, sql: &str) -> Result<QueryRows, ExecutionError>;
}
