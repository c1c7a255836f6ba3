//! Intent Extractor
//!
//! Rule-based interpretation of a question against a catalog. Detection never
//! guesses: singular `table`/`column` are only set when exactly one candidate
//! was found, leaving ambiguity for the synthesizer to reject.

use crate::catalog::SchemaCatalog;
use crate::intent::scorer::{ConfidenceScorer, NoopScorer};
use crate::intent::types::{
    Aggregation, ComparativeKind, ComparativeTag, ExtractionMethod, Filter, FilterOperator,
    Intent, Literal, TemporalTag,
};
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Range;
use tracing::debug;

lazy_static! {
    static ref AGGREGATION_PATTERNS: Vec<(Aggregation, Regex)> = vec![
        (Aggregation::Count, Regex::new(r"\bcount\b|\bhow many\b").unwrap()),
        (Aggregation::Avg, Regex::new(r"\baverage\b|\bavg\b|\bmean\b").unwrap()),
        (Aggregation::Max, Regex::new(r"\bmaximum\b|\bmax\b|\bhighest\b").unwrap()),
        (Aggregation::Min, Regex::new(r"\bminimum\b|\bmin\b|\blowest\b").unwrap()),
        (Aggregation::Sum, Regex::new(r"\bsum\b|\btotal\b").unwrap()),
    ];

    static ref TEMPORAL_PATTERNS: Vec<(TemporalTag, Regex)> = vec![
        (TemporalTag::LastMonth, Regex::new(r"\b(last|past|previous) month\b").unwrap()),
        (TemporalTag::LastYear, Regex::new(r"\b(last|past|previous) year\b").unwrap()),
        (TemporalTag::ThisMonth, Regex::new(r"\b(this|current) month\b").unwrap()),
        (TemporalTag::ThisYear, Regex::new(r"\b(this|current) year\b").unwrap()),
        (TemporalTag::LastWeek, Regex::new(r"\b(last|past) week\b").unwrap()),
        (TemporalTag::Yesterday, Regex::new(r"\byesterday\b|\byday\b").unwrap()),
        (TemporalTag::Today, Regex::new(r"\btoday\b|\bnow\b").unwrap()),
    ];

    static ref COMPARATIVE_PATTERNS: Vec<(ComparativeKind, Regex)> = vec![
        (
            ComparativeKind::GreaterThan,
            Regex::new(r"greater than|more than|\babove\b|\bover\b|>\s*\d+").unwrap(),
        ),
        (
            ComparativeKind::LessThan,
            Regex::new(r"less than|\bbelow\b|\bunder\b|<\s*\d+").unwrap(),
        ),
        (ComparativeKind::Between, Regex::new(r"between\s+\d+\s+and\s+\d+").unwrap()),
        (ComparativeKind::NotEqual, Regex::new(r"not equal|different from|!=|<>").unwrap()),
    ];

    static ref FILTER_PATTERN: Regex =
        Regex::new(r"\b(\w+)\b\s*(=|>|<)\s*(\d+(?:\.\d+)?|\w+)").unwrap();
    static ref NUMERIC_LITERAL: Regex = Regex::new(r"^\d+(\.\d+)?$").unwrap();
}

/// Textual operators rewritten to symbols before filter matching.
const OPERATOR_PHRASES: [(&str, &str); 3] = [
    ("greater than", ">"),
    ("less than", "<"),
    ("equal to", "="),
];

pub struct IntentExtractor {
    scorer: Box<dyn ConfidenceScorer>,
    rule_confidence: f64,
}

impl IntentExtractor {
    /// Rule-only extractor; every intent gets `rule_confidence`.
    pub fn new(rule_confidence: f64) -> Self {
        Self::with_scorer(Box::new(NoopScorer), rule_confidence)
    }

    pub fn with_scorer(scorer: Box<dyn ConfidenceScorer>, rule_confidence: f64) -> Self {
        Self {
            scorer,
            rule_confidence: rule_confidence.clamp(0.0, 1.0),
        }
    }

    pub fn extract(&self, question: &str, catalog: &SchemaCatalog) -> Intent {
        let lower = question.to_lowercase();

        let tables = detect_tables(&lower, catalog);

        // Filter first: columns mentioned only inside the filter expression
        // are not projected.
        let mut normalized = normalize_operators(&lower);
        let filter = match detect_filter(&normalized, question, catalog) {
            Some((filter, span)) => {
                normalized.replace_range(span.clone(), &" ".repeat(span.len()));
                Some(filter)
            }
            None => None,
        };

        let columns = detect_columns(&normalized, &tables, catalog);
        let aggregation = detect_aggregation(&lower);
        let temporal = detect_temporal(&lower);
        let comparative = detect_comparative(&lower);

        let table = single(&tables);
        let column = single(&columns);

        let (confidence, method) = match self.scorer.score(question) {
            Some(score) => (score.clamp(0.0, 1.0), ExtractionMethod::SemanticAssisted),
            None => (self.rule_confidence, ExtractionMethod::RuleBased),
        };

        let intent = Intent {
            table,
            tables,
            column,
            columns,
            aggregation,
            filter,
            temporal,
            comparative,
            confidence,
            method,
        };
        debug!(?intent, "Intent extracted");
        intent
    }
}

impl Default for IntentExtractor {
    fn default() -> Self {
        Self::new(0.6)
    }
}

fn single(items: &[String]) -> Option<String> {
    match items {
        [only] => Some(only.clone()),
        _ => None,
    }
}

/// Byte offset of the first whole-word occurrence of `word`.
fn find_word(haystack: &str, word: &str) -> Option<usize> {
    if word.is_empty() {
        return None;
    }
    Regex::new(&format!(r"\b{}\b", regex::escape(word)))
        .ok()?
        .find(haystack)
        .map(|m| m.start())
}

fn detect_tables(lower: &str, catalog: &SchemaCatalog) -> Vec<String> {
    let mut found: Vec<(usize, usize, &str)> = Vec::new();

    for (idx, table) in catalog.table_schemas().iter().enumerate() {
        let name = table.name.to_lowercase();
        let mut position = find_word(lower, &name);

        // naive singular: STUDENTS also matches "student"
        if let Some(singular) = name.strip_suffix('s') {
            if let Some(pos) = find_word(lower, singular) {
                position = Some(position.map_or(pos, |p| p.min(pos)));
            }
        }

        if let Some(pos) = position {
            found.push((pos, idx, table.name.as_str()));
        }
    }

    found
        .into_iter()
        .sorted_by_key(|(pos, idx, _)| (*pos, *idx))
        .map(|(_, _, name)| name.to_string())
        .unique()
        .collect()
}

fn detect_columns(text: &str, tables: &[String], catalog: &SchemaCatalog) -> Vec<String> {
    let mut found: Vec<(usize, usize, &str)> = Vec::new();
    let mut order = 0;

    for table in tables {
        let Some(schema) = catalog.table(table) else {
            continue;
        };
        for column in &schema.columns {
            if let Some(pos) = find_word(text, &column.to_lowercase()) {
                found.push((pos, order, column.as_str()));
            }
            order += 1;
        }
    }

    found
        .into_iter()
        .sorted_by_key(|(pos, order, _)| (*pos, *order))
        .map(|(_, _, name)| name.to_string())
        .unique_by(|name| name.to_ascii_lowercase())
        .collect()
}

fn detect_aggregation(lower: &str) -> Option<Aggregation> {
    AGGREGATION_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(lower))
        .map(|(agg, _)| *agg)
}

fn detect_temporal(lower: &str) -> Option<TemporalTag> {
    TEMPORAL_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(lower))
        .map(|(tag, _)| *tag)
}

fn detect_comparative(lower: &str) -> Option<ComparativeTag> {
    COMPARATIVE_PATTERNS.iter().find_map(|(kind, pattern)| {
        pattern.find(lower).map(|m| ComparativeTag {
            kind: *kind,
            expression: m.as_str().to_string(),
        })
    })
}

fn normalize_operators(lower: &str) -> String {
    OPERATOR_PHRASES
        .iter()
        .fold(lower.to_string(), |text, (phrase, symbol)| {
            text.replace(phrase, symbol)
        })
}

/// Match `identifier operator value` in the normalized text. The identifier
/// must be a column of some table in the catalog, not only of the detected
/// tables.
fn detect_filter(
    normalized: &str,
    original: &str,
    catalog: &SchemaCatalog,
) -> Option<(Filter, Range<usize>)> {
    let caps = FILTER_PATTERN.captures(normalized)?;
    let whole = caps.get(0)?;
    let identifier = caps.get(1)?.as_str();
    let operator = FilterOperator::parse(caps.get(2)?.as_str())?;
    let raw_value = caps.get(3)?.as_str();

    let column = catalog.canonical_column(identifier)?.to_string();

    let value = if NUMERIC_LITERAL.is_match(raw_value) {
        Literal::Number(raw_value.to_string())
    } else {
        let recovered = recover_original_value(original, identifier);
        Literal::Text(recovered.unwrap_or_else(|| raw_value.to_string()))
    };

    Some((
        Filter {
            column,
            operator,
            value,
        },
        whole.range(),
    ))
}

/// The lower-cased text lost the literal's casing; find it again in the
/// untouched question.
fn recover_original_value(original: &str, identifier: &str) -> Option<String> {
    let pattern = format!(
        r"(?i)\b{}\b\s*(?:=|>|<|greater\s+than|less\s+than|equal\s+to)\s*(\d+(?:\.\d+)?|\w+)",
        regex::escape(identifier)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(original)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
