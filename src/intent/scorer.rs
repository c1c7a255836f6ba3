//! Semantic-assist capability
//!
//! A scorer only ever supplies the Intent's confidence. Structural
//! extraction is always rule-based.

/// Scores how well a question is understood, in `[0, 1]`.
pub trait ConfidenceScorer: Send + Sync {
    /// `None` means the capability is unavailable for this question.
    fn score(&self, question: &str) -> Option<f64>;
}

/// Default scorer: never available, so rule-only confidence applies.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScorer;

impl ConfidenceScorer for NoopScorer {
    fn score(&self, _question: &str) -> Option<f64> {
        None
    }
}

/// Fixed score, handy for hosts that compute confidence out of band.
#[derive(Debug, Clone, Copy)]
pub struct FixedScorer(pub f64);

impl ConfidenceScorer for FixedScorer {
    fn score(&self, _question: &str) -> Option<f64> {
        Some(self.0)
    }
}
