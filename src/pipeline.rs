//! Query Pipeline - question in, validated and executed SQL out
//!
//! Wires the four stages together for one request:
//! 1. Intent extraction against the catalog
//! 2. Allowlist-only SQL synthesis
//! 3. Safety validation
//! 4. Execution under the reflex repair loop
//!
//! Everything a request needs arrives in a `PipelineContext`; the only state
//! a pipeline keeps between requests is the correction history, which can be
//! shared between pipelines.

use crate::catalog::SchemaCatalog;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::execution::{QueryExecutor, QueryRows};
use crate::execution_loop::{CorrectionHistory, CorrectionRecord, LoopState, ReflexLoop, ReflexOutcome};
use crate::intent::{ConfidenceScorer, Intent, IntentExtractor};
use crate::safety::SafetyValidator;
use crate::sql_synthesizer::{SqlPlan, SqlSynthesizer, ValueProbe};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Collaborators for a single invocation.
#[derive(Clone, Copy)]
pub struct PipelineContext<'a> {
    pub catalog: &'a SchemaCatalog,
    pub executor: &'a dyn QueryExecutor,
    pub probe: Option<&'a dyn ValueProbe>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(catalog: &'a SchemaCatalog, executor: &'a dyn QueryExecutor) -> Self {
        Self {
            catalog,
            executor,
            probe: None,
        }
    }

    pub fn with_probe(mut self, probe: &'a dyn ValueProbe) -> Self {
        self.probe = Some(probe);
        self
    }
}

/// What the caller gets back for one question.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    /// Final SQL that passed validation; `None` when nothing was accepted
    pub sql: Option<String>,
    pub confidence: f64,
    pub corrections: Vec<CorrectionRecord>,
    pub error: Option<PipelineError>,
    pub rows: Option<QueryRows>,
    /// `None` when SQL was supplied directly
    pub intent: Option<Intent>,
    pub states: Vec<LoopState>,
}

impl PipelineOutcome {
    fn rejected(intent: Option<Intent>, error: PipelineError) -> Self {
        Self {
            sql: None,
            confidence: 0.0,
            corrections: Vec::new(),
            error: Some(error),
            rows: None,
            intent,
            states: vec![LoopState::Synthesized],
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Caller-facing failure reason.
    pub fn reason(&self) -> Option<String> {
        self.error.as_ref().map(PipelineError::reason)
    }
}

pub struct QueryPipeline {
    extractor: IntentExtractor,
    synthesizer: SqlSynthesizer,
    validator: SafetyValidator,
    reflex: ReflexLoop,
    learning_enabled: bool,
}

impl QueryPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let history = Arc::new(CorrectionHistory::new(config.history_capacity));
        history.set_learning_enabled(config.learning_enabled);

        info!(
            "Query pipeline ready (max repair attempts: {}, history capacity: {})",
            config.max_repair_attempts, config.history_capacity
        );

        Ok(Self {
            extractor: IntentExtractor::new(config.rule_confidence),
            synthesizer: SqlSynthesizer::new(),
            validator: SafetyValidator::new(),
            reflex: ReflexLoop::new(config.max_repair_attempts, history),
            learning_enabled: config.learning_enabled,
        })
    }

    /// Replace the rule-only confidence with a semantic scorer.
    pub fn with_scorer(mut self, scorer: Box<dyn ConfidenceScorer>, rule_confidence: f64) -> Self {
        self.extractor = IntentExtractor::with_scorer(scorer, rule_confidence);
        self
    }

    /// Share a correction history with other pipelines. The history takes
    /// this pipeline's learning setting.
    pub fn with_history(mut self, history: Arc<CorrectionHistory>) -> Self {
        history.set_learning_enabled(self.learning_enabled);
        self.reflex = ReflexLoop::new(self.reflex.max_attempts(), history);
        self
    }

    pub fn history(&self) -> &Arc<CorrectionHistory> {
        self.reflex.history()
    }

    /// Answer a question: extract, synthesize, validate, execute and repair.
    pub fn handle(&self, question: &str, ctx: &PipelineContext<'_>) -> PipelineOutcome {
        info!("Handling question: {}", question);

        let (intent, sql) = match self.synthesize(question, ctx) {
            Ok(planned) => planned,
            Err(outcome) => return outcome,
        };

        let reflex = self.reflex.run(&sql, ctx.catalog, ctx.executor);
        Self::finish(Some(intent.confidence), Some(intent), reflex)
    }

    /// Dry run: everything up to and including validation, nothing is executed.
    pub fn plan(&self, question: &str, ctx: &PipelineContext<'_>) -> PipelineOutcome {
        let (intent, sql) = match self.synthesize(question, ctx) {
            Ok(planned) => planned,
            Err(outcome) => return outcome,
        };

        if let Err(rejection) = self.validator.validate(&sql, ctx.catalog) {
            return PipelineOutcome::rejected(Some(intent), PipelineError::SafetyRejected(rejection));
        }

        PipelineOutcome {
            sql: Some(sql),
            confidence: intent.confidence,
            corrections: Vec::new(),
            error: None,
            rows: None,
            intent: Some(intent),
            states: vec![LoopState::Synthesized, LoopState::Validated],
        }
    }

    /// Run caller-supplied SQL through validation and the repair loop.
    pub fn execute_sql(&self, sql: &str, ctx: &PipelineContext<'_>) -> PipelineOutcome {
        info!("Executing supplied SQL: {}", sql);
        let reflex = self.reflex.run(sql, ctx.catalog, ctx.executor);
        Self::finish(None, None, reflex)
    }

    fn synthesize(
        &self,
        question: &str,
        ctx: &PipelineContext<'_>,
    ) -> std::result::Result<(Intent, String), PipelineOutcome> {
        let intent = self.extractor.extract(question, ctx.catalog);
        info!(
            "Intent: tables={:?} columns={:?} aggregation={:?} confidence={:.2}",
            intent.tables, intent.columns, intent.aggregation, intent.confidence
        );

        let plan = self
            .synthesizer
            .synthesize(&intent, ctx.catalog, ctx.catalog.relations(), ctx.probe);
        match plan {
            SqlPlan::Sql(sql) => Ok((intent, sql)),
            SqlPlan::NoPlan(reason) => {
                warn!("Synthesis rejected: {}", reason);
                Err(PipelineOutcome::rejected(
                    Some(intent),
                    PipelineError::SynthesisRejected(reason),
                ))
            }
        }
    }

    /// Map a loop result onto the consumer contract. Without a repair the
    /// confidence is `base` (1.0 for supplied SQL); after a successful repair
    /// it is that repair's confidence; any failure reports 0.
    fn finish(base: Option<f64>, intent: Option<Intent>, reflex: ReflexOutcome) -> PipelineOutcome {
        let ReflexOutcome {
            sql,
            rows,
            corrections,
            error,
            repair_confidence,
            states,
        } = reflex;

        let confidence = match (&error, repair_confidence) {
            (Some(_), _) => 0.0,
            (None, Some(repaired)) => repaired,
            (None, None) => base.unwrap_or(1.0),
        };

        let sql = match &error {
            Some(PipelineError::SafetyRejected(_)) => None,
            _ => Some(sql),
        };

        match &error {
            None => info!("Question answered with confidence {:.2}", confidence),
            Some(e) => warn!("Question failed: {}", e),
        }

        PipelineOutcome {
            sql,
            confidence,
            corrections,
            error,
            rows,
            intent,
            states,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures;
    use crate::execution::{ExecutionError, ExecutionErrorKind};
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingExecutor {
        seen: RefCell<Vec<String>>,
    }

    impl QueryExecutor for RecordingExecutor {
        fn run(&self, sql: &str) -> std::result::Result<QueryRows, ExecutionError> {
            self.seen.borrow_mut().push(sql.to_string());
            Ok(QueryRows::default())
        }
    }

    struct FailingExecutor;

    impl QueryExecutor for FailingExecutor {
        fn run(&self, _sql: &str) -> std::result::Result<QueryRows, ExecutionError> {
            Err(ExecutionError::new(ExecutionErrorKind::Other, "disk I/O error"))
        }
    }

    fn pipeline() -> QueryPipeline {
        QueryPipeline::new(PipelineConfig::default()).unwrap()
    }

    #[test]
    fn test_handle_executes_synthesized_sql() {
        let catalog = fixtures::university();
        let executor = RecordingExecutor::default();
        let ctx = PipelineContext::new(&catalog, &executor);

        let outcome = pipeline().handle("show STU_FNAME from STUDENT where STU_GPA > 3", &ctx);

        assert!(outcome.succeeded());
        assert_eq!(
            outcome.sql.as_deref(),
            Some("SELECT STU_FNAME FROM STUDENT WHERE STU_GPA > 3")
        );
        assert!((outcome.confidence - 0.6).abs() < 1e-9);
        assert_eq!(executor.seen.borrow().len(), 1);
        assert!(outcome.intent.is_some());
    }

    #[test]
    fn test_no_plan_reports_zero_confidence() {
        let catalog = fixtures::university();
        let executor = RecordingExecutor::default();
        let ctx = PipelineContext::new(&catalog, &executor);

        let outcome = pipeline().handle("what is the weather like", &ctx);

        assert_eq!(outcome.sql, None);
        assert_eq!(outcome.confidence, 0.0);
        assert_eq!(
            outcome.error,
            Some(PipelineError::SynthesisRejected(
                crate::sql_synthesizer::SynthesisRejection::NoTableResolved
            ))
        );
        assert!(executor.seen.borrow().is_empty());
    }

    #[test]
    fn test_plan_does_not_execute() {
        let catalog = fixtures::university();
        let executor = RecordingExecutor::default();
        let ctx = PipelineContext::new(&catalog, &executor);

        let outcome = pipeline().plan("count STUDENT", &ctx);

        assert_eq!(outcome.sql.as_deref(), Some("SELECT COUNT(*) FROM STUDENT"));
        assert!(outcome.rows.is_none());
        assert!(executor.seen.borrow().is_empty());
    }

    #[test]
    fn test_unrepairable_failure_keeps_sql() {
        let catalog = fixtures::university();
        let ctx = PipelineContext::new(&catalog, &FailingExecutor);

        let outcome = pipeline().execute_sql("SELECT STU_FNAME FROM STUDENT", &ctx);

        assert_eq!(outcome.sql.as_deref(), Some("SELECT STU_FNAME FROM STUDENT"));
        assert_eq!(outcome.confidence, 0.0);
        assert_eq!(
            outcome.reason().as_deref(),
            Some("other: disk I/O error")
        );
    }

    #[test]
    fn test_supplied_sql_is_validated() {
        let catalog = fixtures::university();
        let executor = RecordingExecutor::default();
        let ctx = PipelineContext::new(&catalog, &executor);

        let outcome = pipeline().execute_sql("DELETE FROM STUDENT", &ctx);

        assert_eq!(outcome.sql, None);
        assert!(matches!(outcome.error, Some(PipelineError::SafetyRejected(_))));
        assert!(executor.seen.borrow().is_empty());
    }

    #[test]
    fn test_shared_history() {
        let history = Arc::new(CorrectionHistory::new(8));
        let a = pipeline().with_history(Arc::clone(&history));
        let b = pipeline().with_history(Arc::clone(&history));
        assert!(Arc::ptr_eq(a.history(), b.history()));
        assert_eq!(a.history().capacity(), 8);
    }

    #[test]
    fn test_shared_history_takes_learning_setting() {
        let config = PipelineConfig {
            learning_enabled: false,
            ..PipelineConfig::default()
        };
        let history = Arc::new(CorrectionHistory::new(8));
        assert!(history.learning_enabled());

        let pipeline = QueryPipeline::new(config).unwrap().with_history(Arc::clone(&history));

        assert!(!history.learning_enabled());
        assert!(!pipeline.history().learning_enabled());
    }
}
