use super::markers::{extract_activities, Marker, ScannedMarker};
use super::sessions::LessonBounds;
use crate::config::LessonConfig;
use crate::error::PatternWarning;
use crate::types::{Lesson, Problem, Session, SessionType};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

// "7  Solve for x ..." at the start of a line
static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{1,3})[ \t]+(\S.*)$").unwrap());

/// A kept page with the markers found on it, in offset order.
#[derive(Debug, Clone, Serialize)]
pub struct ScannedPage {
    pub page_number: u32,
    pub text: String,
    pub markers: Vec<ScannedMarker>,
}

/// A lesson as the outline pass sees it: boundaries plus accumulated text,
/// before sessions are attached.
#[derive(Debug, Clone, Serialize)]
pub struct LessonDraft {
    pub lesson_number: u32,
    pub title: Option<String>,
    pub unit_theme: Option<String>,
    pub start_page: u32,
    pub end_page: u32,
    pub standards: BTreeSet<String>,
    pub is_major_work: bool,
    /// Text belonging to this lesson, one entry per page (or page part)
    pub segments: Vec<(u32, String)>,
    #[serde(skip)]
    session_markers: usize,
}

impl LessonDraft {
    fn open(lesson_number: u32, page_number: u32, unit_theme: Option<String>) -> Self {
        Self {
            lesson_number,
            title: None,
            unit_theme,
            start_page: page_number,
            end_page: page_number,
            standards: BTreeSet::new(),
            is_major_work: false,
            segments: Vec::new(),
            session_markers: 0,
        }
    }

    /// Opened and closed by header lines on one page with no session marker,
    /// as on a unit opener listing the lessons ahead.
    fn is_title_only(&self) -> bool {
        self.session_markers == 0 && self.start_page == self.end_page
    }

    fn push_segment(&mut self, page_number: u32, text: &str) {
        if !text.trim().is_empty() {
            self.segments.push((page_number, text.to_string()));
        }
    }

    fn text_length(&self) -> usize {
        self.segments.iter().map(|(_, text)| text.trim().chars().count()).sum()
    }

    fn segments_within(&self, start_page: u32, end_page: u32) -> Vec<(u32, &str)> {
        self.segments
            .iter()
            .filter(|(page, _)| (start_page..=end_page).contains(page))
            .map(|(page, text)| (*page, text.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LessonOutline {
    pub drafts: Vec<LessonDraft>,
    pub warnings: Vec<PatternWarning>,
}

impl LessonOutline {
    pub fn bounds(&self) -> LessonBounds {
        self.drafts
            .iter()
            .map(|d| (d.lesson_number, d.start_page..=d.end_page))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LessonAssembly {
    pub lessons: Vec<Lesson>,
    pub synthetic_sessions: usize,
}

/// Which confidence inputs could be measured for a lesson, each in [0,1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceSignals {
    pub title: f32,
    pub richness: Option<f32>,
    pub standards: Option<f32>,
    pub structure: f32,
}

impl ConfidenceSignals {
    /// Equal weights; an unmeasured signal's share goes to the others.
    pub fn score(&self) -> f32 {
        let available: Vec<f32> = [
            Some(self.title),
            self.richness,
            self.standards,
            Some(self.structure),
        ]
        .into_iter()
        .flatten()
        .collect();

        let mean = available.iter().sum::<f32>() / available.len() as f32;
        mean.clamp(0.0, 1.0)
    }
}

pub struct LessonAssembler {
    config: LessonConfig,
}

impl LessonAssembler {
    pub fn new(config: &LessonConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Walk kept pages in order and cut them into lessons.
    ///
    /// A lesson opens on the first marker carrying its number and closes when
    /// a marker for a different lesson appears, so its end page is only known
    /// once the next lesson (or the document end) is reached. A closed lesson
    /// is never reopened.
    pub fn outline(&self, pages: &[ScannedPage]) -> LessonOutline {
        let mut outline = LessonOutline::default();
        let mut current: Option<LessonDraft> = None;
        let mut closed: BTreeSet<u32> = BTreeSet::new();
        let mut reopen_reported: BTreeSet<(u32, u32)> = BTreeSet::new();
        let mut theme: Option<String> = None;

        for page in pages {
            let mut cursor = 0;

            for scanned in &page.markers {
                match &scanned.marker {
                    Marker::Unit {
                        theme: Some(found), ..
                    } => theme = Some(found.clone()),
                    Marker::StandardCode { code } => {
                        if let Some(draft) = current.as_mut() {
                            draft.standards.insert(code.clone());
                        }
                    }
                    Marker::MajorWork => {
                        if let Some(draft) = current.as_mut() {
                            draft.is_major_work = true;
                        }
                    }
                    Marker::LessonSession { lesson_number, .. }
                    | Marker::LessonTitle { lesson_number, .. } => {
                        let lesson_number = *lesson_number;
                        let is_session = matches!(scanned.marker, Marker::LessonSession { .. });
                        let mut title = match &scanned.marker {
                            Marker::LessonTitle { title, .. } => title.clone(),
                            _ => None,
                        };

                        if let Some(draft) = current
                            .as_mut()
                            .filter(|d| d.lesson_number == lesson_number)
                        {
                            if draft.title.is_none() {
                                draft.title = title;
                            }
                            draft.session_markers += usize::from(is_session);
                            continue;
                        }

                        // A session marker outranks a header-only draft: drop the draft
                        // and open the lesson here instead
                        let reclaimable = is_session
                            && outline
                                .drafts
                                .iter()
                                .any(|d| d.lesson_number == lesson_number && d.is_title_only());
                        if reclaimable {
                            if let Some(at) = outline
                                .drafts
                                .iter()
                                .position(|d| d.lesson_number == lesson_number)
                            {
                                let dropped = outline.drafts.remove(at);
                                tracing::debug!(
                                    "Lesson {lesson_number}: header-only draft on page {} replaced by session marker on page {}",
                                    dropped.start_page,
                                    page.page_number
                                );
                                title = dropped.title;
                            }
                            closed.remove(&lesson_number);
                        }

                        if closed.contains(&lesson_number) {
                            if reopen_reported.insert((lesson_number, page.page_number)) {
                                outline.warnings.push(PatternWarning::LessonReopened {
                                    lesson_number,
                                    page: page.page_number,
                                });
                            }
                            continue;
                        }

                        if let Some(mut previous) = current.take() {
                            let before = page.text.get(cursor..scanned.offset).unwrap_or("");
                            previous.push_segment(page.page_number, before);
                            self.close(&mut previous, page.page_number, &mut outline.warnings);
                            closed.insert(previous.lesson_number);
                            outline.drafts.push(previous);
                        }

                        tracing::debug!("Opening lesson {lesson_number} on page {}", page.page_number);
                        let mut draft = LessonDraft::open(lesson_number, page.page_number, theme.clone());
                        draft.title = title;
                        draft.session_markers = usize::from(is_session);
                        current = Some(draft);
                        cursor = scanned.offset;
                    }
                    _ => {}
                }
            }

            if let Some(draft) = current.as_mut() {
                draft.push_segment(page.page_number, page.text.get(cursor..).unwrap_or(""));
                draft.end_page = page.page_number;
            }
        }

        if let Some(last) = current.take() {
            outline.drafts.push(last);
        }
        // Reclaimed lessons are pushed when they close, not where they start
        outline.drafts.sort_by_key(|d| d.start_page);

        for warning in &outline.warnings {
            tracing::warn!("{warning}");
        }
        outline
    }

    fn close(&self, draft: &mut LessonDraft, next_start: u32, warnings: &mut Vec<PatternWarning>) {
        let end_page = next_start.saturating_sub(1);
        if end_page < draft.start_page {
            warnings.push(PatternWarning::LessonRangeClamped {
                lesson_number: draft.lesson_number,
                start_page: draft.start_page,
                end_page,
            });
            draft.end_page = draft.start_page;
        } else {
            draft.end_page = end_page;
        }
    }

    /// Attach sessions to their lessons, extract activities and problems per
    /// session and score each lesson.
    pub fn assemble(
        &self,
        outline: &LessonOutline,
        mut sessions: BTreeMap<u32, Vec<Session>>,
    ) -> LessonAssembly {
        let mut assembly = LessonAssembly::default();
        let document_has_standards = outline.drafts.iter().any(|d| !d.standards.is_empty());

        for draft in &outline.drafts {
            let mut lesson_sessions = sessions.remove(&draft.lesson_number).unwrap_or_default();
            for session in lesson_sessions.iter_mut() {
                let segments = draft.segments_within(session.start_page, session.end_page);
                session.activities = extract_activities(&segments);
                session.problems = self.extract_problems(&segments);
            }

            let detected = lesson_sessions.len();
            let title = draft
                .title
                .clone()
                .unwrap_or_else(|| format!("Lesson {}", draft.lesson_number));

            if detected == 0 && self.config.synthesize_missing_sessions {
                tracing::debug!("Lesson {} has no sessions, adding a synthetic one", draft.lesson_number);
                lesson_sessions.push(self.synthetic_session(draft, &title));
                assembly.synthetic_sessions += 1;
            }

            let signals = self.signals(draft, &title, detected, document_has_standards);
            assembly.lessons.push(Lesson {
                lesson_number: draft.lesson_number,
                title,
                unit_theme: draft.unit_theme.clone(),
                start_page: draft.start_page,
                end_page: draft.end_page,
                standards: draft.standards.clone(),
                is_major_work: draft.is_major_work,
                content_quality_score: signals.score(),
                sessions: lesson_sessions,
            });
        }

        assembly
    }

    fn synthetic_session(&self, draft: &LessonDraft, title: &str) -> Session {
        let segments = draft.segments_within(draft.start_page, draft.end_page);
        let mut session = Session {
            lesson_number: draft.lesson_number,
            session_number: 1,
            session_type: SessionType::Unknown,
            title: title.to_string(),
            start_page: draft.start_page,
            end_page: draft.start_page,
            page_span: 1,
            inferred_type: true,
            content_focus: SessionType::Unknown.default_focus().to_string(),
            activities: extract_activities(&segments),
            problems: self.extract_problems(&segments),
            synthetic: true,
        };
        session.set_end_page(draft.end_page);
        session
    }

    pub fn signals(
        &self,
        draft: &LessonDraft,
        title: &str,
        detected_sessions: usize,
        document_has_standards: bool,
    ) -> ConfidenceSignals {
        let title_quality = if title.chars().count() > 5 && !title.to_lowercase().starts_with("lesson") {
            1.0
        } else {
            0.5
        };

        let length = draft.text_length();
        let richness = (length > 0).then(|| {
            (length as f32 / self.config.reference_content_length as f32).min(1.0)
        });

        let standards = document_has_standards.then(|| match draft.standards.len() {
            0 => 0.3,
            n => (0.7 + 0.15 * n as f32).min(1.0),
        });

        ConfidenceSignals {
            title: title_quality,
            richness,
            standards,
            structure: if detected_sessions > 0 { 1.0 } else { 0.0 },
        }
    }

    /// Numbered exercises in the given text. Lines following a numbered line
    /// are joined onto it until a blank line or the next number.
    pub fn extract_problems(&self, segments: &[(u32, &str)]) -> Vec<Problem> {
        let mut problems: Vec<Problem> = Vec::new();

        for (page_number, text) in segments {
            let mut open: Option<Problem> = None;

            for line in text.lines() {
                let trimmed = line.trim();
                if let Some(caps) = NUMBERED_LINE.captures(line) {
                    self.finish_problem(open.take(), &mut problems);
                    let number = caps.get(1).and_then(|m| m.as_str().parse().ok());
                    let body = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
                    open = number.filter(|_| !body.starts_with('©')).map(|number| Problem {
                        number,
                        text: body.to_string(),
                        page_number: *page_number,
                    });
                } else if trimmed.is_empty() {
                    self.finish_problem(open.take(), &mut problems);
                } else if let Some(problem) = open.as_mut() {
                    problem.text.push(' ');
                    problem.text.push_str(trimmed);
                }
            }
            self.finish_problem(open, &mut problems);
        }

        problems
    }

    fn finish_problem(&self, problem: Option<Problem>, problems: &mut Vec<Problem>) {
        let Some(problem) = problem else { return };
        if problem.text.chars().count() < self.config.min_problem_text_len {
            return;
        }
        let duplicate = problems
            .iter()
            .any(|p| p.number == problem.number && p.text == problem.text);
        if !duplicate {
            problems.push(problem);
        }
    }
}

impl Default for LessonAssembler {
    fn default() -> Self {
        Self::new(&LessonConfig::default())
    }
}

/// Mean of the lesson scores, 0 for a document without lessons.
pub fn document_quality(lessons: &[Lesson]) -> f32 {
    if lessons.is_empty() {
        return 0.0;
    }
    let total: f32 = lessons.iter().map(|l| l.content_quality_score).sum();
    (total / lessons.len() as f32).clamp(0.0, 1.0)
}
