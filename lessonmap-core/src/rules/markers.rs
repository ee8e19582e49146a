use crate::config::ScannerConfig;
use crate::types::{Activity, ActivityKind, SessionType};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

// Unfilled template header: "LESSON # | SESSION #"
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)LESSON\s*#+\s*[|:\-–—•·]?\s*SESSION\s*#+").unwrap());

static LESSON_SESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bLESSON\s+(\d+)\s*[|:\-–—•·]?\s*SESSION\s+(\d+)(?:[ \t]+(Explore|Develop|Refine)\b)?",
    )
    .unwrap()
});

// Page-header form only: "LESSON 8 Solve Problems with Rates". Mixed-case
// "Lesson 8 ..." lines are lesson listings and cross references.
static LESSON_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*LESSON[ \t]+(\d+)\b[ \t]*[:.\-–—]?[ \t]*([^\n]*)$").unwrap()
});

static UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:UNIT|Unit)[ \t]+([A-Z0-9]{1,2})\b[ \t]*[:.\-–—]?[ \t]*([^\n]*)$").unwrap()
});

static STANDARD_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\d{1,2})\.\s?(RP|NS|EE|G|SP|F|A|NBT|NF|OA|MD)\.\s?(?:([A-D])\.\s?)?([1-9]\d?)\b",
    )
    .unwrap()
});

static MAJOR_WORK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bmajor\s+work\b").unwrap());

static MATH_IN_ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bmath\s+in\s+action\b").unwrap());

static ASSESSMENT_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(assessment|test|checkpoint|quiz)\b").unwrap());

static LEADER_AND_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\s*\.[\s.]*){3,}\d*\s*$|\s+\d+\s*$").unwrap());

static ARROWS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[➤→▶►]").unwrap());

static ACTIVITY_VOCABULARY: LazyLock<Vec<(ActivityKind, Regex)>> = LazyLock::new(|| {
    [
        (ActivityKind::TryIt, r"(?i)\btry\s+it\b"),
        (ActivityKind::GuidedPractice, r"(?i)\bguided\s+practice\b"),
        (ActivityKind::IndependentPractice, r"(?i)\bindependent\s+practice\b"),
        (ActivityKind::ProblemSolving, r"(?i)\bproblem\s+solving\b"),
        (ActivityKind::Toolkit, r"(?i)\btoolkit\b"),
        (ActivityKind::Reflection, r"(?i)\breflect(?:ion)?\b"),
        (ActivityKind::Assessment, r"(?i)\bassessment\b"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).unwrap()))
    .collect()
});

/// One structural signal found on a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Marker {
    LessonSession {
        lesson_number: u32,
        session_number: u32,
        explicit_type: Option<SessionType>,
        title: String,
        /// Title is the configured fallback, nothing usable followed the marker
        title_fallback: bool,
        /// Assessment keyword in the text following the marker
        assessment: bool,
    },
    LessonTitle {
        lesson_number: u32,
        title: Option<String>,
    },
    Placeholder,
    StandardCode {
        code: String,
    },
    Unit {
        label: String,
        theme: Option<String>,
    },
    MajorWork,
    MathInAction,
}

impl Marker {
    /// Lesson number for markers that open or continue a lesson
    pub fn lesson_number(&self) -> Option<u32> {
        match self {
            Marker::LessonSession { lesson_number, .. } | Marker::LessonTitle { lesson_number, .. } => {
                Some(*lesson_number)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScannedMarker {
    pub page_number: u32,
    /// Byte offset of the match in the page text
    pub offset: usize,
    pub marker: Marker,
}

/// Runs the ordered pattern rules over one page of text.
pub struct MarkerScanner {
    config: ScannerConfig,
}

impl MarkerScanner {
    pub fn new(config: &ScannerConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn scan(&self, page_text: &str, page_number: u32) -> Vec<ScannedMarker> {
        let mut found = Vec::new();

        // Placeholders first: their lines are blanked so nothing else can match
        // a partial template
        let text = self.mask_placeholders(page_text, page_number, &mut found);
        let text = text.as_str();

        let session_starts: Vec<usize> = LESSON_SESSION.find_iter(text).map(|m| m.start()).collect();

        for caps in LESSON_SESSION.captures_iter(text) {
            let (Some(whole), Some(lesson_number), Some(session_number)) = (
                caps.get(0),
                parse_number(caps.get(1).map(|m| m.as_str())),
                parse_number(caps.get(2).map(|m| m.as_str())),
            ) else {
                continue;
            };
            let explicit_type = caps.get(3).and_then(|m| SessionType::from_word(m.as_str()));

            let segment_end = session_starts
                .iter()
                .copied()
                .find(|start| *start > whole.start())
                .unwrap_or(text.len());
            let following = &text[whole.end()..segment_end];

            let (title, title_fallback) = match self.extract_title(following) {
                Some(title) => (title, false),
                None => (self.config.fallback_title.clone(), true),
            };

            tracing::debug!(
                "Page {page_number}: L{lesson_number}S{session_number} {:?} '{title}'",
                explicit_type
            );
            found.push(ScannedMarker {
                page_number,
                offset: whole.start(),
                marker: Marker::LessonSession {
                    lesson_number,
                    session_number,
                    explicit_type,
                    title,
                    title_fallback,
                    assessment: ASSESSMENT_KEYWORD.is_match(following),
                },
            });
        }

        for caps in LESSON_TITLE.captures_iter(text) {
            let (Some(whole), Some(lesson_number)) =
                (caps.get(0), parse_number(caps.get(1).map(|m| m.as_str())))
            else {
                continue;
            };
            if LESSON_SESSION.is_match(whole.as_str()) {
                continue;
            }
            let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            if rest.trim_start().to_ascii_uppercase().starts_with("SESSION") {
                continue;
            }
            let title = clean_heading(rest)
                .filter(|t| t.chars().count() > self.config.min_title_chars)
                .map(|t| self.truncate(&t))
                .or_else(|| {
                    let next = session_starts
                        .iter()
                        .copied()
                        .find(|start| *start > whole.end())
                        .unwrap_or(text.len());
                    self.extract_title(&text[whole.end()..next])
                });

            found.push(ScannedMarker {
                page_number,
                offset: whole.start(),
                marker: Marker::LessonTitle {
                    lesson_number,
                    title,
                },
            });
        }

        for caps in UNIT.captures_iter(text) {
            let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let theme = caps
                .get(2)
                .and_then(|m| clean_heading(m.as_str()))
                .map(|t| self.truncate(&t));
            found.push(ScannedMarker {
                page_number,
                offset: whole.start(),
                marker: Marker::Unit {
                    label: label.as_str().to_string(),
                    theme,
                },
            });
        }

        for caps in STANDARD_CODE.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            found.push(ScannedMarker {
                page_number,
                offset: whole.start(),
                marker: Marker::StandardCode {
                    code: normalize_standard(&caps),
                },
            });
        }

        if let Some(m) = MAJOR_WORK.find(text) {
            found.push(ScannedMarker {
                page_number,
                offset: m.start(),
                marker: Marker::MajorWork,
            });
        }

        if let Some(m) = MATH_IN_ACTION.find(text) {
            found.push(ScannedMarker {
                page_number,
                offset: m.start(),
                marker: Marker::MathInAction,
            });
        }

        found.sort_by_key(|m| m.offset);
        found
    }

    /// Replace every line holding a placeholder with spaces of equal byte
    /// length, so offsets into the masked text still index the original.
    fn mask_placeholders(
        &self,
        page_text: &str,
        page_number: u32,
        found: &mut Vec<ScannedMarker>,
    ) -> String {
        if !PLACEHOLDER.is_match(page_text) {
            return page_text.to_string();
        }

        let mut masked = String::with_capacity(page_text.len());
        let mut offset = 0;
        for line in page_text.split_inclusive('\n') {
            if let Some(m) = PLACEHOLDER.find(line) {
                tracing::debug!("Page {page_number}: skipping placeholder marker");
                found.push(ScannedMarker {
                    page_number,
                    offset: offset + m.start(),
                    marker: Marker::Placeholder,
                });
                let newline = line.ends_with('\n');
                let body = line.len() - usize::from(newline);
                masked.extend(std::iter::repeat(' ').take(body));
                if newline {
                    masked.push('\n');
                }
            } else {
                masked.push_str(line);
            }
            offset += line.len();
        }
        masked
    }

    /// First line after a marker that can serve as a title: not a copyright
    /// line, not a bare page number, not another marker.
    pub fn extract_title(&self, following: &str) -> Option<String> {
        let cleaned = ARROWS.replace_all(following, "");
        cleaned
            .lines()
            .map(str::trim)
            .filter(|line| line.chars().count() > self.config.min_title_chars)
            .find(|line| {
                !line.starts_with('©')
                    && !line.to_lowercase().contains("copyright")
                    && !line.chars().all(|c| c.is_ascii_digit() || c.is_whitespace())
                    && !LESSON_SESSION.is_match(line)
                    && !LESSON_TITLE.is_match(line)
            })
            .map(|line| self.truncate(line))
    }

    fn truncate(&self, line: &str) -> String {
        let max = self.config.title_max_chars;
        if line.chars().count() > max {
            let head: String = line.chars().take(max.saturating_sub(3)).collect();
            format!("{}...", head.trim_end())
        } else {
            line.to_string()
        }
    }
}

impl Default for MarkerScanner {
    fn default() -> Self {
        Self::new(&ScannerConfig::default())
    }
}

/// Activity records for a session's text, one per vocabulary phrase in
/// vocabulary order. Each segment is `(page_number, text)`.
pub fn extract_activities(segments: &[(u32, &str)]) -> Vec<Activity> {
    let mut activities = Vec::new();
    for (kind, pattern) in ACTIVITY_VOCABULARY.iter() {
        let hit = segments.iter().find_map(|(page, text)| {
            text.lines()
                .find(|line| pattern.is_match(line))
                .map(|line| (*page, line.trim()))
        });
        if let Some((page, line)) = hit {
            activities.push(Activity {
                kind: *kind,
                excerpt: line.chars().take(120).collect(),
                page_number: Some(page),
            });
        }
    }

    if activities.is_empty() {
        activities.push(Activity {
            kind: ActivityKind::Instructional,
            excerpt: String::new(),
            page_number: None,
        });
    }
    activities
}

fn parse_number(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.parse().ok())
}

/// Strip TOC leaders, trailing page numbers and copyright tails from a heading.
fn clean_heading(raw: &str) -> Option<String> {
    let without_copyright = raw.split('©').next().unwrap_or("");
    let cleaned = LEADER_AND_PAGE.replace(without_copyright, "");
    let cleaned = cleaned.trim().trim_end_matches(['.', '|', '-']).trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

fn normalize_standard(caps: &regex::Captures<'_>) -> String {
    let grade = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let domain = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let number = caps.get(4).map(|m| m.as_str()).unwrap_or_default();
    match caps.get(3) {
        Some(cluster) => format!("{grade}.{domain}.{}.{number}", cluster.as_str()),
        None => format!("{grade}.{domain}.{number}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_markers(markers: &[ScannedMarker]) -> Vec<&Marker> {
        markers
            .iter()
            .map(|m| &m.marker)
            .filter(|m| matches!(m, Marker::LessonSession { .. }))
            .collect()
    }

    #[test]
    fn explicit_type_and_same_line_title() {
        let scanner = MarkerScanner::default();
        let markers = scanner.scan("LESSON 7 | SESSION 1 Explore intro text", 1);
        assert_eq!(
            session_markers(&markers),
            vec![&Marker::LessonSession {
                lesson_number: 7,
                session_number: 1,
                explicit_type: Some(SessionType::Explore),
                title: "intro text".to_string(),
                title_fallback: false,
                assessment: false,
            }]
        );
    }

    #[test]
    fn missing_title_falls_back() {
        let scanner = MarkerScanner::default();
        let markers = scanner.scan("LESSON 7 | SESSION 2\n12\n©Curriculum Associates", 2);
        match &markers[0].marker {
            Marker::LessonSession {
                explicit_type,
                title,
                title_fallback,
                ..
            } => {
                assert_eq!(*explicit_type, None);
                assert_eq!(title, "Session Content");
                assert!(*title_fallback);
            }
            other => panic!("unexpected marker {other:?}"),
        }
    }

    #[test]
    fn long_titles_are_truncated() {
        let scanner = MarkerScanner::default();
        let long = "Use ratio reasoning ".repeat(8);
        let markers = scanner.scan(&format!("LESSON 2 | SESSION 3\n{long}"), 9);
        let Marker::LessonSession { title, .. } = &markers[0].marker else {
            panic!("expected a session marker");
        };
        assert!(title.ends_with("..."));
        assert!(title.chars().count() <= 80);
    }

    #[test]
    fn placeholder_masks_its_line() {
        let scanner = MarkerScanner::default();
        let markers = scanner.scan("LESSON # | SESSION #\nSome template text", 4);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].marker, Marker::Placeholder);
    }

    #[test]
    fn placeholder_does_not_hide_other_lines() {
        let scanner = MarkerScanner::default();
        let markers = scanner.scan("LESSON # | SESSION #\nLESSON 3 | SESSION 1 Explore Ratios", 4);
        assert_eq!(markers[0].marker, Marker::Placeholder);
        assert_eq!(session_markers(&markers).len(), 1);
    }

    #[test]
    fn assessment_keyword_is_flagged() {
        let scanner = MarkerScanner::default();
        let markers = scanner.scan("LESSON 5 | SESSION 5 Refine\nCheckpoint: show what you know", 30);
        let Marker::LessonSession { assessment, .. } = &markers[0].marker else {
            panic!("expected a session marker");
        };
        assert!(*assessment);
    }

    #[test]
    fn lesson_title_marker_without_session() {
        let scanner = MarkerScanner::default();
        let markers = scanner.scan("LESSON 8 Understand Proportional Relationships", 6);
        assert_eq!(
            markers[0].marker,
            Marker::LessonTitle {
                lesson_number: 8,
                title: Some("Understand Proportional Relationships".to_string()),
            }
        );
    }

    #[test]
    fn bare_lesson_header_takes_next_line_as_title() {
        let scanner = MarkerScanner::default();
        let markers = scanner.scan("LESSON 8\nSolve Problems with Rates", 6);
        assert_eq!(
            markers[0].marker,
            Marker::LessonTitle {
                lesson_number: 8,
                title: Some("Solve Problems with Rates".to_string()),
            }
        );
    }

    #[test]
    fn mixed_case_lesson_listing_is_not_a_header() {
        let scanner = MarkerScanner::default();
        let markers = scanner.scan("Lesson 8 Solve problems with rates\nLesson 9 Percents", 1);
        assert!(markers.iter().all(|m| m.marker.lesson_number().is_none()));
    }

    #[test]
    fn session_line_is_not_a_title_marker() {
        let scanner = MarkerScanner::default();
        let markers = scanner.scan("LESSON 7 | SESSION 3", 3);
        assert!(markers
            .iter()
            .all(|m| !matches!(m.marker, Marker::LessonTitle { .. })));
    }

    #[test]
    fn standards_are_normalized() {
        let scanner = MarkerScanner::default();
        let markers = scanner.scan("Standards: 7.RP.A.2, 7.EE.4 and 7. NS. 1", 11);
        let codes: Vec<&str> = markers
            .iter()
            .filter_map(|m| match &m.marker {
                Marker::StandardCode { code } => Some(code.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(codes, vec!["7.RP.A.2", "7.EE.4", "7.NS.1"]);
    }

    #[test]
    fn unit_marker_carries_theme() {
        let scanner = MarkerScanner::default();
        let markers = scanner.scan("UNIT 2\nUnit 2 Ratio Reasoning", 40);
        let themes: Vec<Option<&str>> = markers
            .iter()
            .filter_map(|m| match &m.marker {
                Marker::Unit { theme, .. } => Some(theme.as_deref()),
                _ => None,
            })
            .collect();
        assert_eq!(themes, vec![None, Some("Ratio Reasoning")]);
    }

    #[test]
    fn major_work_and_math_in_action_are_detected_once() {
        let scanner = MarkerScanner::default();
        let markers = scanner.scan("Math in Action\nThis is major work. Major work again.", 50);
        let kinds: Vec<&Marker> = markers.iter().map(|m| &m.marker).collect();
        assert_eq!(kinds, vec![&Marker::MathInAction, &Marker::MajorWork]);
    }

    #[test]
    fn activities_follow_vocabulary_order() {
        let segments = [
            (3, "Independent Practice\nSolve each problem."),
            (4, "Try It\nReflect on your answer."),
        ];
        let activities = extract_activities(&segments);
        let kinds: Vec<ActivityKind> = activities.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActivityKind::TryIt,
                ActivityKind::IndependentPractice,
                ActivityKind::Reflection
            ]
        );
        assert_eq!(activities[0].page_number, Some(4));
    }

    #[test]
    fn no_vocabulary_yields_generic_activity() {
        let activities = extract_activities(&[(1, "Plain page")]);
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].kind, ActivityKind::Instructional);
    }
}
