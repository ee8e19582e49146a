use crate::error::PatternWarning;
use crate::rules::ValidationReport;
use crate::types::Document;
use serde::Serialize;

/// Counters for one document run. Built fresh per document and returned
/// with the result, so batch runs never share them.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub content_pages: usize,
    pub noise_pages: usize,
    pub lessons_found: usize,
    /// Detected sessions after deduplication, synthetic ones excluded
    pub total_sessions_found: usize,
    pub sessions_with_explicit_type: usize,
    pub sessions_with_inferred_type: usize,
    pub explicit_type_rate: f32,
    pub session_markers_seen: usize,
    pub duplicate_markers_merged: usize,
    pub stray_session_markers: usize,
    pub placeholder_sessions_skipped: usize,
    pub math_in_action_pages: usize,
    pub synthetic_sessions: usize,
    pub title_fallbacks: usize,
    pub clamped_spans: usize,
    pub anomalous_spans: usize,
    pub validation_errors: usize,
}

impl ExtractionStats {
    pub(crate) fn update_rates(&mut self) {
        self.explicit_type_rate = if self.total_sessions_found == 0 {
            0.0
        } else {
            self.sessions_with_explicit_type as f32 / self.total_sessions_found as f32
        };
    }
}

/// Flat statistics/report object handed to callers next to the hierarchy.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub document: String,
    pub stats: ExtractionStats,
    pub validation: ValidationReport,
    pub warnings: Vec<PatternWarning>,
}

/// What one coordinator run produces for a document.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub document: Document,
    pub report: ExtractionReport,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.document.lessons.is_empty()
    }

    pub fn print_summary(&self) {
        let stats = &self.report.stats;
        println!(
            "📘 {} (grade {}, {}): {} lessons, {} sessions, quality {:.2}",
            self.document.filename,
            self.document.grade,
            self.document.volume,
            stats.lessons_found,
            stats.total_sessions_found,
            self.document.extraction_quality_score
        );
        println!(
            "   📄 Pages: {} content / {} noise",
            stats.content_pages, stats.noise_pages
        );
        println!(
            "   🏷️  Types: {} explicit, {} inferred ({:.0}% explicit)",
            stats.sessions_with_explicit_type,
            stats.sessions_with_inferred_type,
            stats.explicit_type_rate * 100.0
        );
        if stats.placeholder_sessions_skipped > 0 {
            println!(
                "   🚫 Placeholder markers skipped: {}",
                stats.placeholder_sessions_skipped
            );
        }
        if stats.validation_errors > 0 {
            println!(
                "   ⚠️  {} of {} lessons incomplete",
                stats.validation_errors, stats.lessons_found
            );
        } else {
            println!("   ✅ All lessons complete");
        }
    }
}
