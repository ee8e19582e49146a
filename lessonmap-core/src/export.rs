//! Serialized forms of an extraction result.
//!
//! - `hierarchy`: the nested document tree plus the run report, as JSON
//! - `relational`: flat row sets mirroring the persistence schema, linked by
//!   `document_id` / `lesson_id` / `session_id` foreign keys
//! - `summary`: a markdown brief per lesson for human review

use crate::report::{ExtractionReport, ExtractionResult};
use crate::types::{Document, SessionType, Volume};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Hierarchy,
    Relational,
    Summary,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [
        ExportFormat::Hierarchy,
        ExportFormat::Relational,
        ExportFormat::Summary,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Hierarchy | ExportFormat::Relational => "json",
            ExportFormat::Summary => "md",
        }
    }

    /// Export file name for a source document: `RCM07_V1.json` → `RCM07_V1.relational.json`
    pub fn file_name(&self, document: &str) -> String {
        let stem = document
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .filter(|stem| !stem.is_empty())
            .unwrap_or(document);
        format!("{stem}.{self}.{}", self.extension())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Hierarchy => "hierarchy",
            ExportFormat::Relational => "relational",
            ExportFormat::Summary => "summary",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hierarchy" | "json" => Ok(ExportFormat::Hierarchy),
            "relational" | "tables" => Ok(ExportFormat::Relational),
            "summary" | "markdown" | "md" => Ok(ExportFormat::Summary),
            other => Err(format!(
                "unknown export format '{other}' (expected hierarchy, relational or summary)"
            )),
        }
    }
}

/// Provenance stamped into every export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub engine_version: String,
    pub extracted_at: DateTime<Utc>,
    pub input_hash: String,
    pub config_name: String,
    pub config_hash: String,
}

impl ExportMetadata {
    pub fn new(input_hash: String, config_name: &str, config_hash: String) -> Self {
        Self {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            extracted_at: Utc::now(),
            input_hash,
            config_name: config_name.to_string(),
            config_hash,
        }
    }
}

#[derive(Debug, Serialize)]
struct HierarchyExport<'a> {
    metadata: &'a ExportMetadata,
    document: &'a Document,
    report: &'a ExtractionReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalExport {
    pub metadata: ExportMetadata,
    pub documents: Vec<DocumentRow>,
    pub lessons: Vec<LessonRow>,
    pub sessions: Vec<SessionRow>,
    pub activities: Vec<ActivityRow>,
    pub problems: Vec<ProblemRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRow {
    pub id: Uuid,
    pub filename: String,
    pub grade: u32,
    pub volume: Volume,
    pub total_pages: u32,
    pub extraction_quality_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonRow {
    pub id: Uuid,
    pub document_id: Uuid,
    pub lesson_number: u32,
    pub title: String,
    pub unit_theme: Option<String>,
    pub start_page: u32,
    pub end_page: u32,
    pub standards: Vec<String>,
    pub is_major_work: bool,
    pub content_quality_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: Uuid,
    pub lesson_id: Uuid,
    pub session_number: u32,
    pub session_type: SessionType,
    pub title: String,
    pub start_page: u32,
    pub end_page: u32,
    pub page_span: u32,
    pub inferred_type: bool,
    pub content_focus: String,
    pub synthetic: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub position: usize,
    pub activity_type: String,
    pub excerpt: String,
    pub page_number: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub problem_number: u32,
    pub text: String,
    pub page_number: u32,
}

impl RelationalExport {
    pub fn from_document(document: &Document, metadata: ExportMetadata) -> Self {
        let document_id = Uuid::new_v4();
        let mut export = Self {
            metadata,
            documents: vec![DocumentRow {
                id: document_id,
                filename: document.filename.clone(),
                grade: document.grade,
                volume: document.volume,
                total_pages: document.total_pages,
                extraction_quality_score: document.extraction_quality_score,
            }],
            lessons: Vec::new(),
            sessions: Vec::new(),
            activities: Vec::new(),
            problems: Vec::new(),
        };

        for lesson in &document.lessons {
            let lesson_id = Uuid::new_v4();
            export.lessons.push(LessonRow {
                id: lesson_id,
                document_id,
                lesson_number: lesson.lesson_number,
                title: lesson.title.clone(),
                unit_theme: lesson.unit_theme.clone(),
                start_page: lesson.start_page,
                end_page: lesson.end_page,
                standards: lesson.standards.iter().cloned().collect(),
                is_major_work: lesson.is_major_work,
                content_quality_score: lesson.content_quality_score,
            });

            for session in &lesson.sessions {
                let session_id = Uuid::new_v4();
                export.sessions.push(SessionRow {
                    id: session_id,
                    lesson_id,
                    session_number: session.session_number,
                    session_type: session.session_type,
                    title: session.title.clone(),
                    start_page: session.start_page,
                    end_page: session.end_page,
                    page_span: session.page_span,
                    inferred_type: session.inferred_type,
                    content_focus: session.content_focus.clone(),
                    synthetic: session.synthetic,
                });

                export
                    .activities
                    .extend(session.activities.iter().enumerate().map(|(position, activity)| {
                        ActivityRow {
                            id: Uuid::new_v4(),
                            session_id,
                            position,
                            activity_type: activity.kind.label().to_string(),
                            excerpt: activity.excerpt.clone(),
                            page_number: activity.page_number,
                        }
                    }));

                export.problems.extend(session.problems.iter().map(|problem| ProblemRow {
                    id: Uuid::new_v4(),
                    session_id,
                    problem_number: problem.number,
                    text: problem.text.clone(),
                    page_number: problem.page_number,
                }));
            }
        }

        export
    }
}

/// Render an extraction result in the requested format
pub fn render(
    result: &ExtractionResult,
    metadata: &ExportMetadata,
    format: ExportFormat,
) -> serde_json::Result<String> {
    match format {
        ExportFormat::Hierarchy => serde_json::to_string_pretty(&HierarchyExport {
            metadata,
            document: &result.document,
            report: &result.report,
        }),
        ExportFormat::Relational => serde_json::to_string_pretty(&RelationalExport::from_document(
            &result.document,
            metadata.clone(),
        )),
        ExportFormat::Summary => Ok(render_summary(result, metadata)),
    }
}

fn render_summary(result: &ExtractionResult, metadata: &ExportMetadata) -> String {
    let document = &result.document;
    let stats = &result.report.stats;
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(
        out,
        "# {} (Grade {}, {})\n",
        document.filename, document.grade, document.volume
    );
    let _ = writeln!(
        out,
        "Lessons: {} | Sessions: {} | Quality: {:.2} | Explicit types: {:.0}%",
        stats.lessons_found,
        stats.total_sessions_found,
        document.extraction_quality_score,
        stats.explicit_type_rate * 100.0
    );
    let _ = writeln!(
        out,
        "Extracted {} by lessonmap {} ({} config)\n",
        metadata.extracted_at.format("%Y-%m-%d %H:%M UTC"),
        metadata.engine_version,
        metadata.config_name
    );

    for lesson in &document.lessons {
        let _ = writeln!(out, "## Lesson {}: {}\n", lesson.lesson_number, lesson.title);
        if let Some(theme) = &lesson.unit_theme {
            let _ = writeln!(out, "- Unit: {theme}");
        }
        let _ = writeln!(out, "- Pages: {}-{}", lesson.start_page, lesson.end_page);
        let standards = if lesson.standards.is_empty() {
            "none found".to_string()
        } else {
            lesson.standards.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        let _ = writeln!(out, "- Standards: {standards}");
        if lesson.is_major_work {
            let _ = writeln!(out, "- Major work of the grade");
        }
        let _ = writeln!(out, "- Confidence: {:.2}", lesson.content_quality_score);

        for issue in result.report.validation.issues_for(lesson.lesson_number) {
            let _ = writeln!(out, "- Issue: {issue:?}");
        }

        let _ = writeln!(out, "\n| Session | Type | Title | Pages | Activities | Problems |");
        let _ = writeln!(out, "|---|---|---|---|---|---|");
        for session in &lesson.sessions {
            let session_type = if session.inferred_type {
                format!("{} (inferred)", session.session_type)
            } else {
                session.session_type.to_string()
            };
            let _ = writeln!(
                out,
                "| {}{} | {} | {} | {}-{} | {} | {} |",
                session.session_number,
                if session.synthetic { "*" } else { "" },
                session_type,
                session.title.replace('|', "/"),
                session.start_page,
                session.end_page,
                session.activity_tags().join(", "),
                session.problems.len()
            );
        }
        out.push('\n');
    }

    out
}
