use crate::config::ValidationConfig;
use crate::types::Lesson;
use serde::Serialize;
use std::collections::BTreeSet;

// CompletenessValidator - checks session sequences against the canonical pattern
pub struct CompletenessValidator<'a> {
    config: &'a ValidationConfig,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub lessons_checked: usize,
    pub complete_lessons: usize,
    /// Share of lessons whose session set matches the expected one (1.0 when empty)
    pub completeness_rate: f32,
}

impl ValidationReport {
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues_for(&self, lesson_number: u32) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(move |issue| issue.lesson_number() == lesson_number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ValidationIssue {
    IncompleteSessions {
        lesson_number: u32,
        missing: Vec<u32>,
        extra: Vec<u32>,
    },
    /// Only a synthetic stand-in session (or none at all) was produced
    NoDetectedSessions { lesson_number: u32 },
}

impl ValidationIssue {
    pub fn lesson_number(&self) -> u32 {
        match self {
            ValidationIssue::IncompleteSessions { lesson_number, .. }
            | ValidationIssue::NoDetectedSessions { lesson_number } => *lesson_number,
        }
    }
}

impl<'a> CompletenessValidator<'a> {
    pub fn new(config: &'a ValidationConfig) -> Self {
        Self { config }
    }

    /// Compare every lesson's detected session numbers with the expected set.
    /// Never touches the lessons themselves.
    pub fn validate(&self, lessons: &[Lesson]) -> ValidationReport {
        let expected: BTreeSet<u32> = self.config.expected_sessions.iter().copied().collect();
        let mut issues = Vec::new();
        let mut complete_lessons = 0;

        for lesson in lessons {
            let present: BTreeSet<u32> = lesson.detected_sessions().map(|s| s.session_number).collect();

            if present.is_empty() {
                issues.push(ValidationIssue::NoDetectedSessions {
                    lesson_number: lesson.lesson_number,
                });
                continue;
            }

            let missing: Vec<u32> = expected.difference(&present).copied().collect();
            let extra: Vec<u32> = present.difference(&expected).copied().collect();

            if missing.is_empty() && extra.is_empty() {
                complete_lessons += 1;
            } else {
                issues.push(ValidationIssue::IncompleteSessions {
                    lesson_number: lesson.lesson_number,
                    missing,
                    extra,
                });
            }
        }

        let completeness_rate = if lessons.is_empty() {
            1.0
        } else {
            complete_lessons as f32 / lessons.len() as f32
        };

        let report = ValidationReport {
            issues,
            lessons_checked: lessons.len(),
            complete_lessons,
            completeness_rate,
        };
        self.log_report(&report);
        report
    }

    fn log_report(&self, report: &ValidationReport) {
        tracing::info!(
            "Validation: {}/{} lessons complete ({:.0}%)",
            report.complete_lessons,
            report.lessons_checked,
            report.completeness_rate * 100.0
        );

        for issue in &report.issues {
            match issue {
                ValidationIssue::IncompleteSessions {
                    lesson_number,
                    missing,
                    extra,
                } => {
                    tracing::debug!(
                        "Lesson {lesson_number}: missing sessions {missing:?}, unexpected sessions {extra:?}"
                    );
                }
                ValidationIssue::NoDetectedSessions { lesson_number } => {
                    tracing::debug!("Lesson {lesson_number}: no sessions detected");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Session, SessionType};
    use std::collections::BTreeSet;

    fn session(lesson_number: u32, session_number: u32, synthetic: bool) -> Session {
        Session {
            lesson_number,
            session_number,
            session_type: SessionType::Unknown,
            title: "Session Content".to_string(),
            start_page: session_number,
            end_page: session_number,
            page_span: 1,
            inferred_type: true,
            content_focus: String::new(),
            activities: Vec::new(),
            problems: Vec::new(),
            synthetic,
        }
    }

    fn lesson(lesson_number: u32, sessions: Vec<Session>) -> Lesson {
        Lesson {
            lesson_number,
            title: format!("Lesson {lesson_number}"),
            unit_theme: None,
            start_page: 1,
            end_page: 10,
            standards: BTreeSet::new(),
            is_major_work: false,
            content_quality_score: 0.5,
            sessions,
        }
    }

    #[test]
    fn full_sequence_is_complete() {
        let config = ValidationConfig::default();
        let lessons = vec![lesson(1, (1..=5).map(|n| session(1, n, false)).collect())];
        let report = CompletenessValidator::new(&config).validate(&lessons);
        assert!(report.is_complete());
        assert_eq!(report.complete_lessons, 1);
        assert_eq!(report.completeness_rate, 1.0);
    }

    #[test]
    fn gaps_and_extras_are_reported() {
        let config = ValidationConfig::default();
        let sessions = [1, 2, 4, 6].iter().map(|n| session(3, *n, false)).collect();
        let report = CompletenessValidator::new(&config).validate(&[lesson(3, sessions)]);
        assert_eq!(
            report.issues,
            vec![ValidationIssue::IncompleteSessions {
                lesson_number: 3,
                missing: vec![3, 5],
                extra: vec![6],
            }]
        );
        assert_eq!(report.issues_for(3).count(), 1);
        assert_eq!(report.completeness_rate, 0.0);
    }

    #[test]
    fn synthetic_session_does_not_count_as_present() {
        let config = ValidationConfig::default();
        let report =
            CompletenessValidator::new(&config).validate(&[lesson(8, vec![session(8, 1, true)])]);
        assert_eq!(
            report.issues,
            vec![ValidationIssue::NoDetectedSessions { lesson_number: 8 }]
        );
    }

    #[test]
    fn validation_leaves_lessons_untouched() {
        let config = ValidationConfig::default();
        let lessons = vec![lesson(2, vec![session(2, 1, false)])];
        let before = lessons.clone();
        CompletenessValidator::new(&config).validate(&lessons);
        assert_eq!(lessons, before);
    }

    #[test]
    fn empty_document_is_trivially_complete() {
        let config = ValidationConfig::default();
        let report = CompletenessValidator::new(&config).validate(&[]);
        assert_eq!(report.lessons_checked, 0);
        assert_eq!(report.completeness_rate, 1.0);
    }
}
