//! Error and warning types.
//!
//! Only document-level failures are errors: a document that cannot be loaded,
//! an export that cannot be written, or a batch timeout. Everything that goes
//! wrong at page or marker granularity is a [`PatternWarning`], recovered
//! locally, logged, and counted in the run statistics.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractionError>;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to load document {document}: {source}")]
    DocumentLoad {
        document: String,
        #[source]
        source: LoadError,
    },

    #[error("failed to write export for {document}: {message}")]
    SchemaWrite {
        document: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("extraction of {document} timed out after {seconds}s")]
    Timeout { document: String, seconds: u64 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ExtractionError {
    pub fn load(document: impl Into<String>, source: LoadError) -> Self {
        Self::DocumentLoad {
            document: document.into(),
            source,
        }
    }

    pub fn write<E>(document: impl Into<String>, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::SchemaWrite {
            document: document.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DocumentLoad { .. } => ErrorKind::DocumentLoad,
            Self::SchemaWrite { .. } => ErrorKind::SchemaWrite,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

/// Why a document could not be turned into page records.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("input does not match the page-record shape: {0}")]
    Malformed(String),

    #[error("unsupported input type: {0}")]
    UnsupportedFormat(String),

    #[error("cannot determine {field} from metadata or filename '{filename}'")]
    MissingMetadata { filename: String, field: &'static str },
}

/// Serializable error classification used in batch summaries.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ErrorKind {
    DocumentLoad,
    SchemaWrite,
    Timeout,
    Config,
}

/// Non-fatal issue found while turning markers into records.
#[derive(Debug, Clone, Serialize, PartialEq, Error)]
pub enum PatternWarning {
    #[error("lesson {lesson_number} session {session_number} on page {page}: no usable title, using fallback")]
    TitleFallback {
        lesson_number: u32,
        session_number: u32,
        page: u32,
    },

    #[error("lesson {lesson_number} session {session_number}: computed end page {computed_end} before start {start_page}, clamped to one page")]
    SpanClamped {
        lesson_number: u32,
        session_number: u32,
        start_page: u32,
        computed_end: i64,
    },

    #[error("lesson {lesson_number} session {session_number}: unusually long span of {span} pages")]
    AnomalousSpan {
        lesson_number: u32,
        session_number: u32,
        span: u32,
    },

    #[error("lesson {lesson_number} session {session_number}: conflicting explicit types {kept} and {discarded}, keeping {kept}")]
    ConflictingType {
        lesson_number: u32,
        session_number: u32,
        kept: String,
        discarded: String,
    },

    #[error("lesson {lesson_number} marker on page {page} after the lesson was closed, ignored as a lesson start")]
    LessonReopened { lesson_number: u32, page: u32 },

    #[error("lesson {lesson_number}: end page {end_page} before start {start_page}, clamped to one page")]
    LessonRangeClamped {
        lesson_number: u32,
        start_page: u32,
        end_page: u32,
    },
}
