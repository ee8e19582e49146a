use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ===== INPUT TYPES =====
// What a page source hands to the coordinator. Only the shape matters:
// a page number and the text extracted for that page.

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageRecord {
    pub page_number: u32,
    #[serde(alias = "text_preview", alias = "text")]
    pub text_content: String,
}

impl PageRecord {
    pub fn new(page_number: u32, text_content: impl Into<String>) -> Self {
        Self {
            page_number,
            text_content: text_content.into(),
        }
    }
}

/// Raw document as loaded from disk, before any structural inference.
/// Grade and volume are optional here; the coordinator falls back to the
/// filename when they are missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub filename: String,
    #[serde(default)]
    pub grade: Option<u32>,
    #[serde(default)]
    pub volume: Option<Volume>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    pub pages: Vec<PageRecord>,
}

impl SourceDocument {
    pub fn new(filename: impl Into<String>, pages: Vec<PageRecord>) -> Self {
        Self {
            filename: filename.into(),
            grade: None,
            volume: None,
            total_pages: None,
            pages,
        }
    }

    pub fn with_metadata(mut self, grade: u32, volume: Volume) -> Self {
        self.grade = Some(grade);
        self.volume = Some(volume);
        self
    }
}

// ===== CURRICULUM HIERARCHY =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Volume {
    V1,
    V2,
}

impl Volume {
    /// Accepts "V1", "v2", "1", "Volume 2".
    pub fn parse(raw: &str) -> Option<Self> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        match digits.as_str() {
            "1" => Some(Volume::V1),
            "2" => Some(Volume::V2),
            _ => None,
        }
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Volume::V1 => write!(f, "V1"),
            Volume::V2 => write!(f, "V2"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SessionType {
    Explore,
    Develop,
    Refine,
    Unknown,
}

impl SessionType {
    /// Case-insensitive match on the type words printed in session headers.
    pub fn from_word(word: &str) -> Option<Self> {
        match word.trim().to_ascii_lowercase().as_str() {
            "explore" => Some(SessionType::Explore),
            "develop" => Some(SessionType::Develop),
            "refine" => Some(SessionType::Refine),
            _ => None,
        }
    }

    /// Default content-focus text for sessions of this type.
    pub fn default_focus(&self) -> &'static str {
        match self {
            SessionType::Explore => "Prior knowledge activation, concept introduction",
            SessionType::Develop => "Skill building and practice",
            SessionType::Refine => "Fluency practice and extension",
            SessionType::Unknown => "General lesson content",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionType::Explore => "Explore",
            SessionType::Develop => "Develop",
            SessionType::Refine => "Refine",
            SessionType::Unknown => "Unknown",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActivityKind {
    TryIt,
    GuidedPractice,
    IndependentPractice,
    ProblemSolving,
    Toolkit,
    Reflection,
    Assessment,
    /// Fallback tag when no vocabulary phrase appears in the session text.
    Instructional,
}

impl ActivityKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActivityKind::TryIt => "Try It",
            ActivityKind::GuidedPractice => "Guided Practice",
            ActivityKind::IndependentPractice => "Independent Practice",
            ActivityKind::ProblemSolving => "Problem Solving",
            ActivityKind::Toolkit => "Math Toolkit",
            ActivityKind::Reflection => "Reflection",
            ActivityKind::Assessment => "Assessment",
            ActivityKind::Instructional => "Instructional Activity",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub kind: ActivityKind,
    /// Line of source text the activity phrase was found on.
    pub excerpt: String,
    pub page_number: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Problem {
    pub number: u32,
    pub text: String,
    pub page_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub lesson_number: u32,
    pub session_number: u32,
    pub session_type: SessionType,
    pub title: String,
    pub start_page: u32,
    pub end_page: u32,
    pub page_span: u32,
    pub inferred_type: bool,
    pub content_focus: String,
    pub activities: Vec<Activity>,
    pub problems: Vec<Problem>,
    /// Only set for the stand-in session of a lesson without any detected session.
    #[serde(default)]
    pub synthetic: bool,
}

impl Session {
    /// Ordered activity-type tags for this session.
    pub fn activity_tags(&self) -> Vec<&'static str> {
        self.activities.iter().map(|a| a.kind.label()).collect()
    }

    /// Sets the end page and recomputes the derived span.
    pub fn set_end_page(&mut self, end_page: u32) {
        self.end_page = end_page;
        self.page_span = self.end_page.saturating_sub(self.start_page) + 1;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lesson {
    pub lesson_number: u32,
    pub title: String,
    pub unit_theme: Option<String>,
    pub start_page: u32,
    pub end_page: u32,
    pub standards: BTreeSet<String>,
    pub is_major_work: bool,
    pub content_quality_score: f32,
    pub sessions: Vec<Session>,
}

impl Lesson {
    pub fn detected_sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter().filter(|s| !s.synthetic)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub filename: String,
    pub grade: u32,
    pub volume: Volume,
    pub total_pages: u32,
    pub extraction_quality_score: f32,
    pub lessons: Vec<Lesson>,
}

impl Document {
    pub fn lesson(&self, lesson_number: u32) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.lesson_number == lesson_number)
    }

    pub fn session_count(&self) -> usize {
        self.lessons.iter().map(|l| l.sessions.len()).sum()
    }
}
