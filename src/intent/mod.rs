//! Intent extraction: question text + catalog -> structured `Intent`.

pub mod extractor;
pub mod scorer;
pub mod types;

pub use extractor::IntentExtractor;
pub use scorer::{ConfidenceScorer, FixedScorer, NoopScorer};
pub use types::*;
