//! Correction History - Bounded memory of repair attempts
//!
//! Every repair attempt is appended here together with its outcome. The
//! learning strategy reads it back to replay corrections that worked before
//! for the same kind of error.
//!
//! Architecture: ring buffer + per-signature counters
//! - Ring buffer: fixed capacity, oldest record evicted first
//! - Counters: success/failure per error signature, reset only by `clear`
//!
//! All state sits behind one mutex, so concurrent pipelines sharing a
//! history see each lookup and each append as a single atomic step.

use super::error_classifier::ErrorClassifier;
use super::strategies::StrategyKind;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;
use uuid::Uuid;

lazy_static! {
    static ref SINGLE_QUOTED: Regex = Regex::new(r"'[^']*'").unwrap();
    static ref DOUBLE_QUOTED: Regex = Regex::new(r#""[^"]*""#).unwrap();
    static ref QUALIFIED: Regex = Regex::new(r"\b\w+\.\w+\b").unwrap();
    static ref NUMBER: Regex = Regex::new(r"\b\d+\b").unwrap();
}

/// One repair attempt and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub id: Uuid,
    pub original_sql: String,
    pub error_signature: String,
    /// `None` when no strategy changed the query
    pub corrected_sql: Option<String>,
    pub strategy: Option<StrategyKind>,
    /// Human-readable description of each applied correction
    pub corrections: Vec<String>,
    pub confidence: f64,
    /// Whether the corrected query executed successfully
    pub succeeded: bool,
    pub timestamp: DateTime<Utc>,
}

impl CorrectionRecord {
    pub fn new(original_sql: impl Into<String>, error_signature: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_sql: original_sql.into(),
            error_signature: error_signature.into(),
            corrected_sql: None,
            strategy: None,
            corrections: Vec::new(),
            confidence: 0.0,
            succeeded: false,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureStats {
    pub successes: u64,
    pub failures: u64,
}

/// Aggregate view over the history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionStatistics {
    pub total_records: usize,
    pub successful_records: usize,
    /// Percentage in `[0, 100]`
    pub success_rate: f64,
    pub strategy_distribution: BTreeMap<String, usize>,
    /// Signatures with the most failed attempts, most frequent first
    pub common_failure_signatures: Vec<(String, u64)>,
    pub learning_enabled: bool,
    pub capacity: usize,
}

struct HistoryState {
    records: VecDeque<CorrectionRecord>,
    signatures: HashMap<String, SignatureStats>,
    learning_enabled: bool,
}

pub struct CorrectionHistory {
    state: Mutex<HistoryState>,
    capacity: usize,
}

impl CorrectionHistory {
    /// Default number of retained records
    pub const DEFAULT_CAPACITY: usize = 1000;

    const TOP_SIGNATURES: usize = 10;

    /// A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(HistoryState {
                records: VecDeque::with_capacity(capacity.min(1024)),
                signatures: HashMap::new(),
                learning_enabled: true,
            }),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HistoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Append a record, evicting the oldest one when full, and bump the
    /// counter of its signature.
    pub fn append(&self, record: CorrectionRecord) {
        let mut state = self.lock();

        let stats = state
            .signatures
            .entry(record.error_signature.clone())
            .or_default();
        if record.succeeded {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }

        if state.records.len() >= self.capacity {
            state.records.pop_front();
        }
        state.records.push_back(record);
    }

    /// Most recent successful record with this signature that satisfies `accept`.
    pub fn latest_success(
        &self,
        signature: &str,
        accept: impl Fn(&CorrectionRecord) -> bool,
    ) -> Option<CorrectionRecord> {
        self.lock()
            .records
            .iter()
            .rev()
            .find(|r| {
                r.succeeded
                    && r.corrected_sql.is_some()
                    && r.error_signature == signature
                    && accept(r)
            })
            .cloned()
    }

    pub fn signature_stats(&self, signature: &str) -> SignatureStats {
        self.lock()
            .signatures
            .get(signature)
            .copied()
            .unwrap_or_default()
    }

    /// Snapshot of the retained records, oldest first.
    pub fn records(&self) -> Vec<CorrectionRecord> {
        self.lock().records.iter().cloned().collect()
    }

    pub fn learning_enabled(&self) -> bool {
        self.lock().learning_enabled
    }

    pub fn set_learning_enabled(&self, enabled: bool) {
        self.lock().learning_enabled = enabled;
        info!(
            "Repair learning {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Drop all records and counters.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.records.clear();
        state.signatures.clear();
        info!("Correction history cleared");
    }

    pub fn statistics(&self) -> CorrectionStatistics {
        let state = self.lock();

        let total_records = state.records.len();
        let successful_records = state.records.iter().filter(|r| r.succeeded).count();
        let success_rate = if total_records > 0 {
            successful_records as f64 / total_records as f64 * 100.0
        } else {
            0.0
        };

        let strategy_distribution = state
            .records
            .iter()
            .map(|r| r.strategy.map_or("none", |s| s.as_str()).to_string())
            .counts()
            .into_iter()
            .collect();

        let common_failure_signatures = state
            .signatures
            .iter()
            .filter(|(_, stats)| stats.failures > 0)
            .map(|(signature, stats)| (signature.clone(), stats.failures))
            .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
            .take(Self::TOP_SIGNATURES)
            .collect();

        CorrectionStatistics {
            total_records,
            successful_records,
            success_rate,
            strategy_distribution,
            common_failure_signatures,
            learning_enabled: state.learning_enabled,
            capacity: self.capacity,
        }
    }
}

impl Default for CorrectionHistory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// Normalize an engine error message so that errors of the same shape
/// share a key: the offending identifier becomes `<id>`, quoted text
/// `'X'`, qualified names `table.column` and numbers `N`.
pub fn error_signature(message: &str) -> String {
    let mut signature = message.trim().to_lowercase();

    if let Some(identifier) = ErrorClassifier::new().offending_identifier(&signature) {
        if let Ok(re) = Regex::new(&format!(r"\b{}\b", regex::escape(&identifier))) {
            signature = re.replace_all(&signature, "<id>").into_owned();
        }
    }

    let signature = SINGLE_QUOTED.replace_all(&signature, "'X'");
    let signature = DOUBLE_QUOTED.replace_all(&signature, "\"X\"");
    let signature = QUALIFIED.replace_all(&signature, "table.column");
    NUMBER.replace_all(&signature, "N").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(signature: &str, succeeded: bool) -> CorrectionRecord {
        let mut record = CorrectionRecord::new("SELECT a FROM t", signature);
        record.corrected_sql = Some("SELECT b FROM t".to_string());
        record.strategy = Some(StrategyKind::PatternBased);
        record.succeeded = succeeded;
        record
    }

    #[test]
    fn test_error_signature() {
        assert_eq!(
            error_signature("no such column: score"),
            "no such column: <id>"
        );
        assert_eq!(
            error_signature("no such column: marks"),
            error_signature("no such column: score")
        );
        assert_eq!(
            error_signature("near \"FROM\": syntax error"),
            "near \"X\": syntax error"
        );
        assert_eq!(
            error_signature("Value 'abc' out of range at 12"),
            "value 'X' out of range at N"
        );
        assert_ne!(
            error_signature("no such table: t"),
            error_signature("no such column: t")
        );
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let history = CorrectionHistory::new(2);
        let first = record("a", true);
        let first_id = first.id;
        history.append(first);
        history.append(record("b", true));
        history.append(record("c", false));

        let records = history.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.id != first_id));
        assert_eq!(records[0].error_signature, "b");
        // counters outlive eviction
        assert_eq!(history.signature_stats("a").successes, 1);
    }

    #[test]
    fn test_latest_success() {
        let history = CorrectionHistory::new(10);
        let mut older = record("sig", true);
        older.corrected_sql = Some("SELECT old FROM t".to_string());
        history.append(older);
        history.append(record("sig", true));
        history.append(record("sig", false));

        let found = history.latest_success("sig", |_| true).unwrap();
        assert_eq!(found.corrected_sql.as_deref(), Some("SELECT b FROM t"));
        assert!(history.latest_success("other", |_| true).is_none());
        assert!(history
            .latest_success("sig", |r| r.original_sql.contains("zzz"))
            .is_none());
    }

    #[test]
    fn test_statistics_and_clear() {
        let history = CorrectionHistory::default();
        history.append(record("sig", true));
        history.append(record("sig", false));
        history.append(record("other", false));

        let stats = history.statistics();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.successful_records, 1);
        assert!((stats.success_rate - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.strategy_distribution.get("pattern_based"), Some(&3));
        assert_eq!(
            stats.common_failure_signatures,
            vec![("other".to_string(), 1), ("sig".to_string(), 1)]
        );

        history.set_learning_enabled(false);
        assert!(!history.statistics().learning_enabled);

        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.signature_stats("sig"), SignatureStats::default());
    }
}
