pub mod catalog;
pub mod config;
pub mod error;
pub mod execution;
pub mod execution_loop;
pub mod intent;
pub mod pipeline;
pub mod safety;
pub mod sql_synthesizer;
pub mod sqlite;

pub use catalog::{ForeignKey, SchemaCatalog, SchemaDescription, SchemaIntrospector, TableSchema};
pub use config::PipelineConfig;
pub use error::{PipelineError, QueryPilotError, Result};
pub use execution::{ExecutionError, ExecutionErrorKind, QueryExecutor, QueryRows};
pub use execution_loop::{CorrectionHistory, CorrectionRecord, ReflexLoop};
pub use intent::{Intent, IntentExtractor};
pub use pipeline::{PipelineContext, PipelineOutcome, QueryPipeline};
pub use safety::{SafetyRejection, SafetyValidator};
pub use sql_synthesizer::{SqlPlan, SqlSynthesizer, SynthesisRejection, ValueProbe};
pub use sqlite::SqliteDatabase;
