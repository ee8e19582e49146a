use super::markers::{Marker, ScannedMarker};
use crate::config::SessionConfig;
use crate::error::PatternWarning;
use crate::types::{Session, SessionType};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// Page range of every lesson the outline pass opened, keyed by lesson number.
pub type LessonBounds = BTreeMap<u32, RangeInclusive<u32>>;

const ASSESSMENT_FOCUS: &str = "Assessment and evaluation";

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub markers_seen: usize,
    pub duplicates_merged: usize,
    /// Markers for a lesson whose range does not cover the marker's page
    pub stray_markers: usize,
    pub explicit_type: usize,
    pub inferred_type: usize,
    pub title_fallbacks: usize,
    pub clamped_spans: usize,
    pub anomalous_spans: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SessionAssembly {
    pub sessions: BTreeMap<u32, Vec<Session>>,
    pub stats: SessionStats,
    pub warnings: Vec<PatternWarning>,
}

/// All markers seen for one (lesson, session) key, folded together.
#[derive(Debug)]
struct Candidate {
    start_page: u32,
    title: String,
    title_fallback: bool,
    explicit_type: Option<SessionType>,
    assessment: bool,
}

pub struct SessionAssembler {
    config: SessionConfig,
}

impl SessionAssembler {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Turn page-ordered markers into deduplicated, typed and ranged sessions.
    /// Only session markers that fall inside their lesson's bounds are used.
    pub fn assemble(&self, markers: &[ScannedMarker], bounds: &LessonBounds) -> SessionAssembly {
        let mut assembly = SessionAssembly::default();
        let mut candidates: BTreeMap<(u32, u32), Candidate> = BTreeMap::new();

        for scanned in markers {
            let Marker::LessonSession {
                lesson_number,
                session_number,
                explicit_type,
                title,
                title_fallback,
                assessment,
            } = &scanned.marker
            else {
                continue;
            };
            assembly.stats.markers_seen += 1;

            let in_bounds = bounds
                .get(lesson_number)
                .is_some_and(|range| range.contains(&scanned.page_number));
            if !in_bounds {
                tracing::debug!(
                    "Page {}: L{lesson_number}S{session_number} outside its lesson, ignored",
                    scanned.page_number
                );
                assembly.stats.stray_markers += 1;
                continue;
            }

            let key = (*lesson_number, *session_number);
            match candidates.get_mut(&key) {
                None => {
                    candidates.insert(
                        key,
                        Candidate {
                            start_page: scanned.page_number,
                            title: title.clone(),
                            title_fallback: *title_fallback,
                            explicit_type: *explicit_type,
                            assessment: *assessment,
                        },
                    );
                }
                Some(existing) => {
                    assembly.stats.duplicates_merged += 1;
                    self.merge(existing, key, scanned, &mut assembly.warnings);
                }
            }
        }

        for ((lesson_number, session_number), candidate) in candidates {
            let (session_type, inferred_type) = match candidate.explicit_type {
                Some(explicit) => {
                    assembly.stats.explicit_type += 1;
                    (explicit, false)
                }
                None => {
                    assembly.stats.inferred_type += 1;
                    (self.infer_type(session_number), true)
                }
            };

            if candidate.title_fallback {
                assembly.stats.title_fallbacks += 1;
                assembly.warnings.push(PatternWarning::TitleFallback {
                    lesson_number,
                    session_number,
                    page: candidate.start_page,
                });
            }

            let content_focus = if candidate.assessment {
                ASSESSMENT_FOCUS.to_string()
            } else {
                session_type.default_focus().to_string()
            };

            assembly
                .sessions
                .entry(lesson_number)
                .or_default()
                .push(Session {
                    lesson_number,
                    session_number,
                    session_type,
                    title: candidate.title,
                    start_page: candidate.start_page,
                    end_page: candidate.start_page,
                    page_span: 1,
                    inferred_type,
                    content_focus,
                    activities: Vec::new(),
                    problems: Vec::new(),
                    synthetic: false,
                });
        }

        // BTreeMap iteration already yields sessions in session_number order
        for (lesson_number, sessions) in assembly.sessions.iter_mut() {
            if let Some(range) = bounds.get(lesson_number) {
                self.compute_ranges(sessions, *range.end(), &mut assembly.stats, &mut assembly.warnings);
            }
        }

        for warning in &assembly.warnings {
            tracing::warn!("{warning}");
        }
        tracing::info!(
            "Assembled {} sessions from {} markers ({} merged, {} explicit, {} inferred)",
            assembly.stats.explicit_type + assembly.stats.inferred_type,
            assembly.stats.markers_seen,
            assembly.stats.duplicates_merged,
            assembly.stats.explicit_type,
            assembly.stats.inferred_type
        );
        assembly
    }

    pub fn infer_type(&self, session_number: u32) -> SessionType {
        self.config
            .inference_table
            .get(&session_number)
            .copied()
            .unwrap_or(SessionType::Unknown)
    }

    fn merge(
        &self,
        existing: &mut Candidate,
        (lesson_number, session_number): (u32, u32),
        scanned: &ScannedMarker,
        warnings: &mut Vec<PatternWarning>,
    ) {
        let Marker::LessonSession {
            explicit_type,
            title,
            title_fallback,
            assessment,
            ..
        } = &scanned.marker
        else {
            return;
        };

        existing.start_page = existing.start_page.min(scanned.page_number);
        existing.assessment |= *assessment;

        // A real title always beats the fallback, then the longer one wins
        if !*title_fallback
            && (existing.title_fallback || title.chars().count() > existing.title.chars().count())
        {
            existing.title = title.clone();
            existing.title_fallback = false;
        }

        match (existing.explicit_type, explicit_type) {
            (None, Some(found)) => existing.explicit_type = Some(*found),
            (Some(kept), Some(found)) if kept != *found => {
                warnings.push(PatternWarning::ConflictingType {
                    lesson_number,
                    session_number,
                    kept: kept.to_string(),
                    discarded: found.to_string(),
                });
            }
            _ => {}
        }
    }

    fn compute_ranges(
        &self,
        sessions: &mut [Session],
        lesson_end: u32,
        stats: &mut SessionStats,
        warnings: &mut Vec<PatternWarning>,
    ) {
        let next_starts: Vec<Option<u32>> = sessions
            .iter()
            .skip(1)
            .map(|s| Some(s.start_page))
            .chain(std::iter::once(None))
            .collect();

        for (session, next_start) in sessions.iter_mut().zip(next_starts) {
            let computed_end = match next_start {
                Some(next) => i64::from(next) - 1,
                None => i64::from(session.start_page + self.config.default_span)
                    .min(i64::from(lesson_end)),
            };

            if computed_end < i64::from(session.start_page) {
                stats.clamped_spans += 1;
                warnings.push(PatternWarning::SpanClamped {
                    lesson_number: session.lesson_number,
                    session_number: session.session_number,
                    start_page: session.start_page,
                    computed_end,
                });
                session.set_end_page(session.start_page);
            } else {
                session.set_end_page(u32::try_from(computed_end).unwrap_or(session.start_page));
            }

            if session.page_span > self.config.anomalous_span_threshold {
                stats.anomalous_spans += 1;
                warnings.push(PatternWarning::AnomalousSpan {
                    lesson_number: session.lesson_number,
                    session_number: session.session_number,
                    span: session.page_span,
                });
            }
        }
    }
}

impl Default for SessionAssembler {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}
