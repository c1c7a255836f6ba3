//! Error types
//!
//! `QueryPilotError` covers infrastructure faults (catalog loading, SQLite,
//! configuration). Failures of the question pipeline itself are values, not
//! faults: they are modelled by `PipelineError` and returned inside the
//! pipeline outcome.

use crate::execution::ExecutionError;
use crate::safety::SafetyRejection;
use crate::sql_synthesizer::SynthesisRejection;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryPilotError {
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, QueryPilotError>;

/// Why a question did not produce an executed answer.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PipelineError {
    /// The synthesizer refused to build a plan.
    #[error("{0}")]
    SynthesisRejected(SynthesisRejection),

    /// The validator refused the SQL, either as synthesized or as repaired.
    #[error("{0}")]
    SafetyRejected(SafetyRejection),

    /// Execution failed with an error the repair loop does not retry.
    #[error("{0}")]
    ExecutionFailed(ExecutionError),

    /// No strategy could change the query, or the attempt budget ran out.
    #[error("repair exhausted after {attempts} attempt(s): {last_error}")]
    RepairExhausted { attempts: u8, last_error: String },
}

impl PipelineError {
    /// Caller-facing reason string.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}
