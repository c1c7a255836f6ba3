pub mod error_classifier;
pub mod history;
pub mod reflex_loop;
pub mod similarity;
pub mod strategies;

pub use error_classifier::*;
pub use history::*;
pub use reflex_loop::*;
pub use similarity::{IdentifierKind, SimilarityMatcher};
pub use strategies::*;
