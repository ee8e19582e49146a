//! Pipeline scenario tests: whole documents in, lesson hierarchies out.
//!
//! Page dumps live in `test_fixtures/pages/`. Each test runs the full
//! coordinator (classification, scanning, assembly, validation) and checks
//! the structure that comes out the other end.

use lessonmap_core::classifier::{NoiseReason, PageClass};
use lessonmap_core::rules::ValidationIssue;
use lessonmap_core::sources::{source_for, PageSource};
use lessonmap_core::*;
use std::path::PathBuf;

// ============================================================================
// Fixture helpers
// ============================================================================

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_fixtures/pages")
}

fn load_fixture(name: &str) -> SourceDocument {
    let path = fixtures_dir().join(name);
    let source = source_for(&path).expect("Unsupported fixture type");
    source
        .load_file(&path)
        .unwrap_or_else(|e| panic!("Cannot load fixture {}: {e}", path.display()))
}

fn extract(name: &str) -> ExtractionResult {
    ExtractionCoordinator::default()
        .extract(load_fixture(name))
        .expect("Extraction failed")
}

fn session_types(lesson: &Lesson) -> Vec<SessionType> {
    lesson.sessions.iter().map(|s| s.session_type).collect()
}

// ============================================================================
// Scenario A: one full lesson followed by the next lesson's opener
// ============================================================================

mod scenario_a {
    use super::*;

    #[test]
    fn lesson_seven_has_five_contiguous_sessions() {
        let result = extract("RCM07_scenario_a_V1.json");
        let lesson = result.document.lesson(7).expect("Lesson 7 missing");

        assert_eq!((lesson.start_page, lesson.end_page), (1, 5));
        let ranges: Vec<(u32, u32, u32)> = lesson
            .sessions
            .iter()
            .map(|s| (s.session_number, s.start_page, s.end_page))
            .collect();
        assert_eq!(
            ranges,
            vec![(1, 1, 1), (2, 2, 2), (3, 3, 3), (4, 4, 4), (5, 5, 5)]
        );
    }

    #[test]
    fn types_mix_explicit_and_inferred() {
        let result = extract("RCM07_scenario_a_V1.json");
        let lesson = result.document.lesson(7).unwrap();

        assert_eq!(
            session_types(lesson),
            vec![
                SessionType::Explore,
                SessionType::Develop,
                SessionType::Develop,
                SessionType::Develop,
                SessionType::Refine
            ]
        );
        let inferred: Vec<bool> = lesson.sessions.iter().map(|s| s.inferred_type).collect();
        assert_eq!(inferred, vec![false, true, true, true, false]);
        assert_eq!(lesson.sessions[0].title, "intro text");
        assert_eq!(lesson.sessions[4].title, "wrap-up");
        assert_eq!(lesson.sessions[1].title, "Session Content");
    }

    #[test]
    fn lesson_eight_opens_on_page_six() {
        let result = extract("RCM07_scenario_a_V1.json");
        let numbers: Vec<u32> = result.document.lessons.iter().map(|l| l.lesson_number).collect();
        assert_eq!(numbers, vec![7, 8]);

        let lesson = result.document.lesson(8).unwrap();
        assert_eq!((lesson.start_page, lesson.end_page), (6, 6));
        assert_eq!(lesson.detected_sessions().count(), 0);
        assert!(lesson.sessions[0].synthetic);
    }

    #[test]
    fn report_counts_and_validation() {
        let result = extract("RCM07_scenario_a_V1.json");
        let stats = &result.report.stats;

        assert_eq!(stats.total_sessions_found, 5);
        assert_eq!(stats.sessions_with_explicit_type, 2);
        assert_eq!(stats.sessions_with_inferred_type, 3);
        assert_eq!(stats.synthetic_sessions, 1);
        assert_eq!(stats.title_fallbacks, 3);
        assert_eq!(
            result.report.validation.issues,
            vec![ValidationIssue::NoDetectedSessions { lesson_number: 8 }]
        );
        assert_eq!(result.document.grade, 7);
        assert_eq!(result.document.volume, Volume::V1);
        assert_eq!(result.document.total_pages, 6);
    }
}

// ============================================================================
// Scenario B: table-of-contents pages before the real lessons
// ============================================================================

mod scenario_b {
    use super::*;

    #[test]
    fn toc_pages_are_noise() {
        let source = load_fixture("RCM06_scenario_b_V2.json");
        let (_, stages) = ExtractionCoordinator::default()
            .extract_capture_stages(source)
            .unwrap();

        let classes: Vec<&PageClass> = stages.page_classes.iter().map(|c| &c.class).collect();
        assert!(matches!(
            classes[0],
            PageClass::Noise(NoiseReason::TableOfContents { .. })
        ));
        assert!(matches!(
            classes[1],
            PageClass::Noise(NoiseReason::DenseLeaders { .. })
        ));
        assert!(!classes[2].is_content());
        assert!(classes[3..].iter().all(|c| c.is_content()));
    }

    #[test]
    fn extraction_starts_at_real_content() {
        let result = extract("RCM06_scenario_b_V2.json");
        let numbers: Vec<u32> = result.document.lessons.iter().map(|l| l.lesson_number).collect();

        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(result.document.lessons[0].start_page, 4);
        assert_eq!(result.report.stats.noise_pages, 3);
        assert_eq!(result.document.grade, 6);
        assert_eq!(result.document.volume, Volume::V2);
    }

    #[test]
    fn sessions_carry_titles_activities_and_problems() {
        let result = extract("RCM06_scenario_b_V2.json");
        let lesson = result.document.lesson(1).unwrap();

        assert_eq!(lesson.sessions[0].title, "Introduction to Ratios");
        assert_eq!(lesson.sessions[0].activity_tags(), vec!["Try It"]);
        assert_eq!(lesson.sessions[0].problems.len(), 1);
        assert_eq!(lesson.sessions[1].activity_tags(), vec!["Guided Practice"]);
        assert!(result.document.lesson(2).unwrap().standards.contains("6.RP.A.2"));
    }
}

// ============================================================================
// Mixed plain-text volume: boilerplate, units, placeholders, interstitials
// ============================================================================

mod mixed_volume {
    use super::*;

    #[test]
    fn plain_text_pages_load_in_order() {
        let source = load_fixture("RCM07_mixed_V1.txt");
        assert_eq!(source.pages.len(), 7);
        assert_eq!(source.pages[6].page_number, 7);
    }

    #[test]
    fn lesson_metadata_is_collected() {
        let result = extract("RCM07_mixed_V1.txt");
        let lesson = result.document.lesson(3).unwrap();

        assert_eq!(lesson.title, "Understand Proportional Relationships");
        assert_eq!(lesson.unit_theme.as_deref(), Some("Proportional Relationships"));
        assert!(lesson.is_major_work);
        assert_eq!(lesson.standards.iter().collect::<Vec<_>>(), vec!["7.RP.A.2"]);
        assert_eq!((lesson.start_page, lesson.end_page), (2, 6));

        let next = result.document.lesson(4).unwrap();
        assert!(!next.is_major_work);
        assert!(next.standards.contains("7.RP.A.3"));
    }

    #[test]
    fn placeholder_and_interstitial_pages_are_counted() {
        let result = extract("RCM07_mixed_V1.txt");
        let stats = &result.report.stats;

        assert_eq!(stats.noise_pages, 1);
        assert_eq!(stats.placeholder_sessions_skipped, 1);
        assert_eq!(stats.math_in_action_pages, 1);
        assert_eq!(stats.total_sessions_found, 3);
    }

    #[test]
    fn assessment_keywords_override_focus() {
        let result = extract("RCM07_mixed_V1.txt");
        let sessions = &result.document.lesson(3).unwrap().sessions;

        assert_eq!(
            sessions[0].content_focus,
            "Prior knowledge activation, concept introduction"
        );
        assert_eq!(sessions[1].content_focus, "Assessment and evaluation");
        assert_eq!((sessions[1].start_page, sessions[1].end_page), (5, 6));
    }

    #[test]
    fn incomplete_lessons_are_reported_not_dropped() {
        let result = extract("RCM07_mixed_V1.txt");
        assert_eq!(result.document.lessons.len(), 2);
        assert_eq!(result.report.stats.validation_errors, 2);
        assert!(result
            .report
            .validation
            .issues_for(3)
            .any(|issue| matches!(issue, ValidationIssue::IncompleteSessions { missing, .. } if missing == &vec![3, 4, 5])));
    }
}

// ============================================================================
// Marker precedence and immunity
// ============================================================================

mod markers {
    use super::*;

    fn document(pages: &[(u32, &str)]) -> SourceDocument {
        SourceDocument::new(
            "RCM07_V1.json",
            pages.iter().map(|(n, text)| PageRecord::new(*n, *text)).collect(),
        )
    }

    #[test]
    fn placeholder_only_page_yields_nothing() {
        let result = ExtractionCoordinator::default()
            .extract(document(&[(1, "LESSON # | SESSION #")]))
            .unwrap();

        assert!(result.is_empty());
        assert_eq!(result.document.session_count(), 0);
        assert_eq!(result.report.stats.placeholder_sessions_skipped, 1);
    }

    #[test]
    fn explicit_type_wins_regardless_of_page_order() {
        let result = ExtractionCoordinator::default()
            .extract(document(&[
                (11, "LESSON 2 | SESSION 3 Refine\nFluency Practice"),
                (10, "LESSON 2 | SESSION 3"),
            ]))
            .unwrap();
        let session = &result.document.lesson(2).unwrap().sessions[0];

        assert_eq!(session.session_type, SessionType::Refine);
        assert!(!session.inferred_type);
        assert_eq!(session.start_page, 10);
        assert_eq!(session.title, "Fluency Practice");
    }

    fn lesson_listing_volume(listing: &str) -> ExtractionResult {
        ExtractionCoordinator::default()
            .extract(document(&[
                (1, listing),
                (2, "LESSON 8 | SESSION 1 Explore\nRates in tables"),
                (3, "LESSON 8 | SESSION 2 Develop\nUnit rates"),
                (4, "LESSON 9 | SESSION 1 Explore\nPercent models"),
                (5, "LESSON 9 | SESSION 2 Develop\nPercent of a number"),
                (6, "LESSON 10 | SESSION 1 Explore\nScale factors"),
            ]))
            .unwrap()
    }

    fn assert_listing_does_not_steal_sessions(result: &ExtractionResult) {
        let counts: Vec<(u32, usize)> = result
            .document
            .lessons
            .iter()
            .map(|l| (l.lesson_number, l.detected_sessions().count()))
            .collect();
        assert_eq!(counts, vec![(8, 2), (9, 2), (10, 1)]);
        assert_eq!(result.report.stats.stray_session_markers, 0);
        assert_eq!(result.report.stats.total_sessions_found, 5);
        assert_eq!(result.report.stats.synthetic_sessions, 0);
    }

    #[test]
    fn unit_opener_lesson_listing_is_ignored() {
        let result = lesson_listing_volume(
            "UNIT 2 Ratios and Rates\nLesson 8 Solve problems with rates\nLesson 9 Percents\nLesson 10 Scale drawings",
        );
        assert_listing_does_not_steal_sessions(&result);
        assert_eq!(result.document.lessons[0].start_page, 2);
        assert_eq!(result.document.lessons[0].unit_theme.as_deref(), Some("Ratios and Rates"));
    }

    #[test]
    fn uppercase_lesson_listing_yields_to_session_markers() {
        let result = lesson_listing_volume(
            "UNIT 2 Ratios and Rates\nLESSON 8 Solve problems with rates\nLESSON 9 Percents\nLESSON 10 Scale drawings",
        );
        assert_listing_does_not_steal_sessions(&result);
        let lesson = result.document.lesson(8).unwrap();
        assert_eq!((lesson.start_page, lesson.end_page), (2, 3));
        assert_eq!(lesson.title, "Solve problems with rates");
    }

    #[test]
    fn confidence_stays_in_bounds() {
        let result = extract("RCM06_scenario_b_V2.json");
        for lesson in &result.document.lessons {
            assert!((0.0..=1.0).contains(&lesson.content_quality_score));
        }
        assert!((0.0..=1.0).contains(&result.document.extraction_quality_score));
    }
}
