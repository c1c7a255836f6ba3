//! Reflex Loop
//!
//! Bounded execute -> repair -> re-validate -> re-execute cycle.
//!
//! ```text
//! SYNTHESIZED -> VALIDATED -> EXECUTING -> SUCCESS
//!                                 |
//!                          EXECUTION_ERROR -> REPAIR_ATTEMPT -> VALIDATED -> ...
//!                                 |
//!                          REPAIR_EXHAUSTED
//! ```
//!
//! Only identifier and syntax errors enter repair. Every repaired statement
//! goes back through the safety validator before it is executed.

use super::history::{error_signature, CorrectionHistory, CorrectionRecord};
use super::strategies::{default_strategies, Repair, RepairContext, RepairStrategy, StrategyKind};
use crate::catalog::SchemaCatalog;
use crate::error::PipelineError;
use crate::execution::{QueryExecutor, QueryRows};
use crate::safety::SafetyValidator;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Repairs slower than this lose 0.1 confidence.
const SLOW_REPAIR: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    Synthesized,
    Validated,
    Executing,
    Success,
    ExecutionError,
    RepairAttempt,
    RepairExhausted,
}

/// Result of one run through the loop
#[derive(Debug, Clone)]
pub struct ReflexOutcome {
    /// Last SQL that was validated or executed
    pub sql: String,
    pub rows: Option<QueryRows>,
    /// Repair attempts made during this run, oldest first
    pub corrections: Vec<CorrectionRecord>,
    pub error: Option<PipelineError>,
    /// Confidence of the repair that produced `sql`, if any
    pub repair_confidence: Option<f64>,
    pub states: Vec<LoopState>,
}

impl ReflexOutcome {
    fn new(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            rows: None,
            corrections: Vec::new(),
            error: None,
            repair_confidence: None,
            states: vec![LoopState::Synthesized],
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.rows.is_some()
    }

    pub fn final_state(&self) -> Option<LoopState> {
        self.states.last().copied()
    }

    fn enter(&mut self, state: LoopState) {
        info!("Reflex state -> {:?}", state);
        self.states.push(state);
    }

    fn fail(mut self, error: PipelineError) -> Self {
        warn!("Reflex loop stopped: {}", error);
        self.error = Some(error);
        self
    }
}

/// Confidence of a completed repair.
pub fn repair_confidence(strategy: StrategyKind, corrections: usize, elapsed: Duration) -> f64 {
    if corrections == 0 {
        return 0.0;
    }

    let mut confidence = strategy.base_confidence();
    if corrections == 1 {
        confidence += 0.1;
    } else if corrections > 3 {
        confidence -= 0.2;
    }
    if elapsed > SLOW_REPAIR {
        confidence -= 0.1;
    }
    confidence.clamp(0.0, 1.0)
}

/// Reflex loop with bounded repair attempts
pub struct ReflexLoop {
    max_attempts: u8,
    strategies: Vec<Box<dyn RepairStrategy>>,
    history: Arc<CorrectionHistory>,
    validator: SafetyValidator,
}

impl ReflexLoop {
    pub fn new(max_attempts: u8, history: Arc<CorrectionHistory>) -> Self {
        Self::with_strategies(max_attempts, history, default_strategies())
    }

    pub fn with_strategies(
        max_attempts: u8,
        history: Arc<CorrectionHistory>,
        strategies: Vec<Box<dyn RepairStrategy>>,
    ) -> Self {
        Self {
            max_attempts,
            strategies,
            history,
            validator: SafetyValidator::new(),
        }
    }

    pub fn max_attempts(&self) -> u8 {
        self.max_attempts
    }

    pub fn history(&self) -> &Arc<CorrectionHistory> {
        &self.history
    }

    /// Validate and execute `sql`, repairing it on identifier or syntax errors.
    pub fn run(
        &self,
        sql: &str,
        catalog: &SchemaCatalog,
        executor: &dyn QueryExecutor,
    ) -> ReflexOutcome {
        let mut outcome = ReflexOutcome::new(sql);

        if let Err(rejection) = self.validator.validate(sql, catalog) {
            return outcome.fail(PipelineError::SafetyRejected(rejection));
        }
        outcome.enter(LoopState::Validated);

        let ctx = RepairContext {
            catalog,
            history: &self.history,
        };
        let mut current = sql.to_string();
        let mut attempts: u8 = 0;
        // repair awaiting the execution result of its SQL
        let mut pending: Option<CorrectionRecord> = None;

        loop {
            outcome.enter(LoopState::Executing);
            let result = executor.run(&current);

            if let Some(mut record) = pending.take() {
                record.succeeded = result.is_ok();
                self.record(&mut outcome, record);
            }

            let error = match result {
                Ok(rows) => {
                    info!("Execution succeeded after {} repair attempt(s)", attempts);
                    outcome.enter(LoopState::Success);
                    outcome.sql = current;
                    outcome.rows = Some(rows);
                    return outcome;
                }
                Err(error) => error,
            };

            outcome.enter(LoopState::ExecutionError);
            outcome.sql = current.clone();

            if !error.is_repairable() {
                return outcome.fail(PipelineError::ExecutionFailed(error));
            }

            if attempts >= self.max_attempts {
                outcome.enter(LoopState::RepairExhausted);
                return outcome.fail(PipelineError::RepairExhausted {
                    attempts,
                    last_error: error.message,
                });
            }

            attempts += 1;
            outcome.enter(LoopState::RepairAttempt);
            info!("Repair attempt {} of {}", attempts, self.max_attempts);

            let started = Instant::now();
            let proposal = self.strategies.iter().find_map(|strategy| {
                strategy
                    .attempt(&current, &error, &ctx)
                    .filter(|repair| repair.sql != current)
                    .map(|repair| (strategy.kind(), repair))
            });
            let elapsed = started.elapsed();

            let mut record = CorrectionRecord::new(current.clone(), error_signature(&error.message));

            let Some((strategy, Repair { sql: repaired, corrections })) = proposal else {
                // no strategy changed the text: confidence stays 0
                self.record(&mut outcome, record);
                outcome.enter(LoopState::RepairExhausted);
                return outcome.fail(PipelineError::RepairExhausted {
                    attempts,
                    last_error: error.message,
                });
            };

            let confidence = repair_confidence(strategy, corrections.len(), elapsed);
            info!(
                "Reflex correction applied: {} with confidence {:.2}",
                strategy, confidence
            );

            record.corrected_sql = Some(repaired.clone());
            record.strategy = Some(strategy);
            record.corrections = corrections;
            record.confidence = confidence;

            if let Err(rejection) = self.validator.validate(&repaired, catalog) {
                self.record(&mut outcome, record);
                outcome.sql = repaired;
                return outcome.fail(PipelineError::SafetyRejected(rejection));
            }
            outcome.enter(LoopState::Validated);

            outcome.repair_confidence = Some(confidence);
            pending = Some(record);
            current = repaired;
        }
    }

    fn record(&self, outcome: &mut ReflexOutcome, record: CorrectionRecord) {
        self.history.append(record.clone());
        outcome.corrections.push(record);
    }
}
