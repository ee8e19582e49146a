// Lessonmap Core Library
//
// Reconstructs the lesson/session structure of curriculum volumes from
// page-by-page extracted text. Main interface for turning page dumps into
// validated curriculum hierarchies.

pub mod batch;
pub mod classifier;
pub mod config;
pub mod error;
pub mod export;
pub mod processor;
pub mod report;
pub mod rules;
pub mod sources;
pub mod storage;
pub mod types;

// Re-export main types and functions for easy use
pub use batch::{BatchOptions, BatchRunner, BatchSummary, DocumentOutcome};
pub use classifier::{PageClass, PageClassifier};
pub use config::{ConfigManager, ExtractionConfig};
pub use error::{ExtractionError, LoadError, PatternWarning};
pub use export::{ExportFormat, ExportMetadata};
pub use processor::{ExtractionCoordinator, PipelineStages, Stage, StageProfiler, StageTiming};
pub use report::{ExtractionReport, ExtractionResult, ExtractionStats};
pub use sources::{JsonPageSource, PageSource, PlainTextPageSource};
pub use storage::{ExportSink, FileSink, NoOpSink};
pub use types::*;
