//! Error Classifier
//!
//! Maps raw engine error messages onto the execution error taxonomy and
//! pulls out the identifier the engine complained about.

use crate::execution::{ExecutionError, ExecutionErrorKind};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref OFFENDING_IDENTIFIER: Vec<Regex> = vec![
        Regex::new(r#"(?i)no such (?:table|column):\s*"?([\w\.]+)"?"#).unwrap(),
        Regex::new(r#"(?i)ambiguous column(?: name)?:\s*"?([\w\.]+)"?"#).unwrap(),
        Regex::new(r#"(?i)(?:table|column|relation)\s+["'`]?([\w\.]+)["'`]?\s+does not exist"#).unwrap(),
        Regex::new(r#"(?i)unknown (?:table|column):?\s*["'`]?([\w\.]+)["'`]?"#).unwrap(),
        Regex::new(r#"(?i)misuse of aggregate(?: function)?:?\s*(\w+)"#).unwrap(),
        Regex::new(r#"(?i)near\s+"([^"]+)":\s*syntax error"#).unwrap(),
    ];
}

/// Error classifier
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a raw engine message into the taxonomy
    pub fn classify(&self, message: &str) -> ExecutionErrorKind {
        let error_msg = message.to_lowercase();

        if error_msg.contains("ambiguous column") {
            return ExecutionErrorKind::AmbiguousColumn;
        }

        if error_msg.contains("no such table")
            || error_msg.contains("unknown table")
            || ((error_msg.contains("table") || error_msg.contains("relation"))
                && error_msg.contains("does not exist"))
        {
            return ExecutionErrorKind::UnknownTable;
        }

        if error_msg.contains("no such column")
            || error_msg.contains("unknown column")
            || (error_msg.contains("column") && error_msg.contains("does not exist"))
        {
            return ExecutionErrorKind::UnknownColumn;
        }

        if error_msg.contains("syntax error")
            || error_msg.contains("unrecognized token")
            || error_msg.contains("incomplete input")
            || error_msg.contains("misuse of aggregate")
        {
            return ExecutionErrorKind::SyntaxError;
        }

        if error_msg.contains("interrupted")
            || error_msg.contains("timeout")
            || error_msg.contains("timed out")
        {
            return ExecutionErrorKind::Timeout;
        }

        ExecutionErrorKind::Other
    }

    pub fn to_execution_error(&self, message: impl Into<String>) -> ExecutionError {
        let message = message.into();
        ExecutionError::new(self.classify(&message), message)
    }

    /// Identifier named in the message, e.g. `score` for `no such column: score`.
    pub fn offending_identifier(&self, message: &str) -> Option<String> {
        OFFENDING_IDENTIFIER
            .iter()
            .find_map(|re| re.captures(message))
            .map(|caps| caps[1].to_string())
    }
}
