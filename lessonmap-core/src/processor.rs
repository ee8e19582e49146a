use crate::classifier::{PageClass, PageClassifier};
use crate::config::ExtractionConfig;
use crate::error::{ExtractionError, LoadError, Result};
use crate::report::{ExtractionReport, ExtractionResult, ExtractionStats};
use crate::rules::{
    document_quality, CompletenessValidator, LessonAssembler, LessonAssembly, LessonOutline, Marker,
    MarkerScanner, ScannedMarker, ScannedPage, SessionAssembler, SessionAssembly, ValidationReport,
};
use crate::types::*;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

static FILENAME_GRADE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:RCM|grade[_\- ]?)(\d{1,2})|(?:^|[_\- ])G(\d{1,2})(?:[_\- .]|$)").unwrap()
});

static FILENAME_VOLUME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[_\- .])V(?:ol(?:ume)?)?[_\- ]?([12])(?:[_\- .]|$)").unwrap()
});

/// Captured intermediate outputs from each pipeline stage
/// Used for testing and diagnostics, lets you inspect each boundary
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStages {
    pub page_classes: Vec<PageClassification>,
    pub markers: Vec<ScannedMarker>,
    pub outline: LessonOutline,
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageClassification {
    pub page_number: u32,
    pub class: PageClass,
}

/// The six extraction stages, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Classification,
    Scanning,
    Outline,
    Sessions,
    Lessons,
    Validation,
}

impl Stage {
    fn label(&self) -> &'static str {
        match self {
            Stage::Classification => "Page classification",
            Stage::Scanning => "Marker scanning",
            Stage::Outline => "Lesson outline",
            Stage::Sessions => "Session assembly",
            Stage::Lessons => "Lesson assembly",
            Stage::Validation => "Validation",
        }
    }

    /// What the stage's output count measures
    fn unit(&self) -> &'static str {
        match self {
            Stage::Classification => "content pages",
            Stage::Scanning => "markers",
            Stage::Outline => "lessons opened",
            Stage::Sessions => "sessions",
            Stage::Lessons => "lessons",
            Stage::Validation => "issues",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed: Duration,
    pub produced: usize,
}

/// Per-stage wall time and output size for one document
pub struct StageProfiler {
    enabled: bool,
    timings: Vec<StageTiming>,
}

impl StageProfiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timings: Vec::new(),
        }
    }

    /// Run `work` as `stage`; `count` reports how much it produced
    pub fn record<R>(
        &mut self,
        stage: Stage,
        work: impl FnOnce() -> R,
        count: impl FnOnce(&R) -> usize,
    ) -> R {
        if !self.enabled {
            return work();
        }

        let start = Instant::now();
        let output = work();
        let timing = StageTiming {
            stage,
            elapsed: start.elapsed(),
            produced: count(&output),
        };
        println!(
            "⏱️  {}: {:.1}ms, {} {}",
            stage.label(),
            timing.elapsed.as_secs_f64() * 1000.0,
            timing.produced,
            stage.unit()
        );
        self.timings.push(timing);
        output
    }

    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    pub fn print_summary(&self, filename: &str, pages: usize) {
        if !self.enabled || self.timings.is_empty() {
            return;
        }

        let total: Duration = self.timings.iter().map(|t| t.elapsed).sum();
        println!("\n📊 {filename}: {pages} pages in {:.1}ms", total.as_secs_f64() * 1000.0);
        if let Some(slowest) = self.timings.iter().max_by_key(|t| t.elapsed) {
            println!("   slowest stage: {}", slowest.stage.label());
        }
        if !total.is_zero() {
            println!("   {:.0} pages/s", pages as f64 / total.as_secs_f64());
        }
    }
}

/// Drives one document through classification, scanning, assembly and
/// validation. Holds no per-document state, so one coordinator can serve
/// many documents concurrently.
pub struct ExtractionCoordinator {
    config: ExtractionConfig,
    classifier: PageClassifier,
    scanner: MarkerScanner,
    session_assembler: SessionAssembler,
    lesson_assembler: LessonAssembler,
}

impl ExtractionCoordinator {
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            classifier: PageClassifier::new(&config.classifier),
            scanner: MarkerScanner::new(&config.scanner),
            session_assembler: SessionAssembler::new(&config.sessions),
            lesson_assembler: LessonAssembler::new(&config.lessons),
            config,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract the curriculum hierarchy from one document
    pub fn extract(&self, source: SourceDocument) -> Result<ExtractionResult> {
        let (result, _) = self.run(source, &mut StageProfiler::new(false), false)?;
        Ok(result)
    }

    /// Extract with per-stage timings and output counts printed as each
    /// stage finishes
    pub fn extract_with_profiling(&self, source: SourceDocument) -> Result<ExtractionResult> {
        let mut profiler = StageProfiler::new(true);
        let (result, _) = self.run(source, &mut profiler, false)?;
        profiler.print_summary(&result.document.filename, result.report.stats.total_pages);
        Ok(result)
    }

    /// Extract and capture all intermediate stage outputs
    pub fn extract_capture_stages(
        &self,
        source: SourceDocument,
    ) -> Result<(ExtractionResult, PipelineStages)> {
        let (result, stages) = self.run(source, &mut StageProfiler::new(false), true)?;
        let stages = stages.ok_or_else(|| {
            ExtractionError::Config("stage capture requested but not produced".to_string())
        })?;
        Ok((result, stages))
    }

    fn run(
        &self,
        source: SourceDocument,
        profiler: &mut StageProfiler,
        capture: bool,
    ) -> Result<(ExtractionResult, Option<PipelineStages>)> {
        let start_time = Instant::now();
        let (grade, volume) = resolve_metadata(&source)
            .map_err(|e| ExtractionError::load(source.filename.clone(), e))?;

        let SourceDocument {
            filename,
            total_pages,
            mut pages,
            ..
        } = source;
        tracing::info!("Extracting {filename} (grade {grade}, {volume}, {} pages)", pages.len());

        // Lesson boundaries depend on page order, whatever order the source used
        pages.sort_by_key(|p| p.page_number);
        let total_pages = total_pages
            .or_else(|| pages.last().map(|p| p.page_number))
            .unwrap_or(0);

        let mut stats = ExtractionStats {
            total_pages: pages.len(),
            ..ExtractionStats::default()
        };

        // Stage 1: Page classification
        let page_classes: Vec<PageClassification> = profiler.record(
            Stage::Classification,
            || {
                pages
                    .iter()
                    .map(|page| PageClassification {
                        page_number: page.page_number,
                        class: self.classifier.classify(&page.text_content),
                    })
                    .collect()
            },
            |classes: &Vec<PageClassification>| classes.iter().filter(|c| c.class.is_content()).count(),
        );
        stats.content_pages = page_classes.iter().filter(|c| c.class.is_content()).count();
        stats.noise_pages = page_classes.len() - stats.content_pages;
        tracing::info!(
            "Classified {} pages: {} content, {} noise",
            page_classes.len(),
            stats.content_pages,
            stats.noise_pages
        );

        // Stage 2: Marker scanning over kept pages
        let scanned: Vec<ScannedPage> = profiler.record(
            Stage::Scanning,
            || {
                pages
                    .into_iter()
                    .zip(&page_classes)
                    .filter(|(_, class)| class.class.is_content())
                    .map(|(page, _)| ScannedPage {
                        markers: self.scanner.scan(&page.text_content, page.page_number),
                        page_number: page.page_number,
                        text: page.text_content,
                    })
                    .collect()
            },
            |scanned: &Vec<ScannedPage>| scanned.iter().map(|p| p.markers.len()).sum(),
        );
        let markers: Vec<ScannedMarker> = scanned
            .iter()
            .flat_map(|page| page.markers.iter().cloned())
            .collect();
        stats.placeholder_sessions_skipped = markers
            .iter()
            .filter(|m| m.marker == Marker::Placeholder)
            .count();
        stats.math_in_action_pages = markers
            .iter()
            .filter(|m| m.marker == Marker::MathInAction)
            .count();

        // Stage 3: Lesson outline, then sessions inside each lesson's bounds
        let outline = profiler.record(
            Stage::Outline,
            || self.lesson_assembler.outline(&scanned),
            |outline: &LessonOutline| outline.drafts.len(),
        );
        let session_assembly = profiler.record(
            Stage::Sessions,
            || self.session_assembler.assemble(&markers, &outline.bounds()),
            |assembly: &SessionAssembly| assembly.sessions.values().map(Vec::len).sum(),
        );

        let session_stats = &session_assembly.stats;
        stats.session_markers_seen = session_stats.markers_seen;
        stats.duplicate_markers_merged = session_stats.duplicates_merged;
        stats.stray_session_markers = session_stats.stray_markers;
        stats.sessions_with_explicit_type = session_stats.explicit_type;
        stats.sessions_with_inferred_type = session_stats.inferred_type;
        stats.total_sessions_found = session_stats.explicit_type + session_stats.inferred_type;
        stats.title_fallbacks = session_stats.title_fallbacks;
        stats.clamped_spans = session_stats.clamped_spans;
        stats.anomalous_spans = session_stats.anomalous_spans;

        let mut warnings = outline.warnings.clone();
        warnings.extend(session_assembly.warnings);

        // Stage 4: Lessons with enrichment and confidence
        let lesson_assembly = profiler.record(
            Stage::Lessons,
            || self.lesson_assembler.assemble(&outline, session_assembly.sessions),
            |assembly: &LessonAssembly| assembly.lessons.len(),
        );
        stats.lessons_found = lesson_assembly.lessons.len();
        stats.synthetic_sessions = lesson_assembly.synthetic_sessions;

        // Stage 5: Completeness validation
        let validation = profiler.record(
            Stage::Validation,
            || CompletenessValidator::new(&self.config.validation).validate(&lesson_assembly.lessons),
            |report: &ValidationReport| report.issues.len(),
        );
        stats.validation_errors = validation.issues.len();
        stats.update_rates();

        let document = Document {
            filename: filename.clone(),
            grade,
            volume,
            total_pages,
            extraction_quality_score: document_quality(&lesson_assembly.lessons),
            lessons: lesson_assembly.lessons,
        };

        if document.lessons.is_empty() {
            tracing::warn!("{filename}: no lessons found, input may not match the expected markers");
        }
        tracing::info!(
            "Extracted {} lessons / {} sessions from {filename} in {:.0}ms",
            stats.lessons_found,
            stats.total_sessions_found,
            start_time.elapsed().as_millis()
        );

        let stages = capture.then(|| PipelineStages {
            page_classes,
            markers,
            outline,
            lessons: document.lessons.clone(),
        });

        let report = ExtractionReport {
            document: filename,
            stats,
            validation,
            warnings,
        };
        Ok((ExtractionResult { document, report }, stages))
    }
}

impl Default for ExtractionCoordinator {
    fn default() -> Self {
        Self::new(ExtractionConfig::default())
    }
}

/// Grade and volume from the document itself, falling back to the filename
/// (`RCM07_NA_SW_V1.pdf` → grade 7, V1).
pub fn resolve_metadata(source: &SourceDocument) -> std::result::Result<(u32, Volume), LoadError> {
    let grade = source
        .grade
        .or_else(|| grade_from_filename(&source.filename))
        .ok_or_else(|| LoadError::MissingMetadata {
            filename: source.filename.clone(),
            field: "grade",
        })?;
    let volume = source
        .volume
        .or_else(|| volume_from_filename(&source.filename))
        .ok_or_else(|| LoadError::MissingMetadata {
            filename: source.filename.clone(),
            field: "volume",
        })?;
    Ok((grade, volume))
}

fn grade_from_filename(filename: &str) -> Option<u32> {
    let caps = FILENAME_GRADE.captures(filename)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

fn volume_from_filename(filename: &str) -> Option<Volume> {
    FILENAME_VOLUME
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .and_then(|m| Volume::parse(m.as_str()))
}
