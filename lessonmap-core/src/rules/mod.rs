// Structural rules, leaf-first:
// - markers.rs: per-page pattern scanning (sessions, titles, standards, units)
// - lessons.rs: lesson outline state machine, enrichment and confidence
// - sessions.rs: session dedup, type inference and page ranges
// - validation.rs: completeness checks against the canonical session set

pub mod lessons;
pub mod markers;
pub mod sessions;
pub mod validation;

pub use lessons::{document_quality, LessonAssembler, LessonAssembly, LessonOutline, ScannedPage};
pub use markers::{extract_activities, Marker, MarkerScanner, ScannedMarker};
pub use sessions::{LessonBounds, SessionAssembler, SessionAssembly, SessionStats};
pub use validation::{CompletenessValidator, ValidationIssue, ValidationReport};
