use crate::types::SessionType;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;

// Default value functions for serde
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Name used when listing presets and in export metadata
    #[serde(default = "default_preset_name")]
    pub name: String,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub lessons: LessonConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

fn default_preset_name() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Name of the rule
    pub name: String,
    /// Whether this rule is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl RuleConfig {
    fn enabled(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Noise rules in evaluation order; the first match wins
    #[serde(default = "default_classifier_rules")]
    pub rules: Vec<RuleConfig>,
    /// How many table-of-contents signals must co-occur on one page
    #[serde(default = "default_min_toc_signals")]
    pub min_toc_signals: usize,
    /// Minimum run of consecutive dots counted as a TOC leader
    #[serde(default = "default_dot_leader_min_run")]
    pub dot_leader_min_run: usize,
    /// A page with more leader lines than this is a TOC on its own
    #[serde(default = "default_dense_leader_lines")]
    pub dense_leader_lines: usize,
    /// Pages shorter than this (in characters) may be boilerplate
    #[serde(default = "default_boilerplate_max_length")]
    pub boilerplate_max_length: usize,
    /// Lowercase phrases that mark copyright/publisher pages
    #[serde(default = "default_boilerplate_phrases")]
    pub boilerplate_phrases: Vec<String>,
}

fn default_classifier_rules() -> Vec<RuleConfig> {
    vec![
        RuleConfig::enabled("toc_signals"),
        RuleConfig::enabled("dense_leaders"),
        RuleConfig::enabled("boilerplate"),
    ]
}

fn default_min_toc_signals() -> usize {
    2
}

fn default_dot_leader_min_run() -> usize {
    5
}

fn default_dense_leader_lines() -> usize {
    3
}

fn default_boilerplate_max_length() -> usize {
    500
}

fn default_boilerplate_phrases() -> Vec<String> {
    vec![
        "copyright".to_string(),
        "©".to_string(),
        "all rights reserved".to_string(),
        "curriculum associates".to_string(),
        "acknowledgments".to_string(),
        "no part of this book".to_string(),
    ]
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rules: default_classifier_rules(),
            min_toc_signals: default_min_toc_signals(),
            dot_leader_min_run: default_dot_leader_min_run(),
            dense_leader_lines: default_dense_leader_lines(),
            boilerplate_max_length: default_boilerplate_max_length(),
            boilerplate_phrases: default_boilerplate_phrases(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Session titles longer than this are truncated with "..."
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
    /// Title used when no line after a session marker qualifies
    #[serde(default = "default_fallback_title")]
    pub fallback_title: String,
    /// Lines this short (after trimming) are never taken as titles
    #[serde(default = "default_min_title_chars")]
    pub min_title_chars: usize,
}

fn default_title_max_chars() -> usize {
    80
}

fn default_fallback_title() -> String {
    "Session Content".to_string()
}

fn default_min_title_chars() -> usize {
    3
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            title_max_chars: default_title_max_chars(),
            fallback_title: default_fallback_title(),
            min_title_chars: default_min_title_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Pages added to the start of a lesson's last session when nothing bounds it.
    /// Tuned on one curriculum's layout; other corpora may need a different value.
    #[serde(default = "default_span")]
    pub default_span: u32,
    /// Sessions spanning more pages than this are reported as anomalous
    #[serde(default = "default_anomalous_span_threshold")]
    pub anomalous_span_threshold: u32,
    /// Session type by position when the marker carries no type word
    #[serde(default = "default_inference_table")]
    pub inference_table: BTreeMap<u32, SessionType>,
}

fn default_span() -> u32 {
    3
}

fn default_anomalous_span_threshold() -> u32 {
    8
}

fn default_inference_table() -> BTreeMap<u32, SessionType> {
    BTreeMap::from([
        (1, SessionType::Explore),
        (2, SessionType::Develop),
        (3, SessionType::Develop),
        (4, SessionType::Develop),
        (5, SessionType::Refine),
    ])
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_span: default_span(),
            anomalous_span_threshold: default_anomalous_span_threshold(),
            inference_table: default_inference_table(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonConfig {
    /// Numbered lines with shorter trailing text are page numbers, not problems
    #[serde(default = "default_min_problem_text_len")]
    pub min_problem_text_len: usize,
    /// Lesson text length that scores full marks for content richness
    #[serde(default = "default_reference_content_length")]
    pub reference_content_length: usize,
    /// Give lessons without detected sessions one Unknown session spanning the lesson
    #[serde(default = "default_true")]
    pub synthesize_missing_sessions: bool,
}

fn default_min_problem_text_len() -> usize {
    20
}

fn default_reference_content_length() -> usize {
    1500
}

impl Default for LessonConfig {
    fn default() -> Self {
        Self {
            min_problem_text_len: default_min_problem_text_len(),
            reference_content_length: default_reference_content_length(),
            synthesize_missing_sessions: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Canonical session numbers every lesson should carry
    #[serde(default = "default_expected_sessions")]
    pub expected_sessions: Vec<u32>,
}

fn default_expected_sessions() -> Vec<u32> {
    (1..=5).collect()
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            expected_sessions: default_expected_sessions(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            name: default_preset_name(),
            classifier: ClassifierConfig::default(),
            scanner: ScannerConfig::default(),
            sessions: SessionConfig::default(),
            lessons: LessonConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl ExtractionConfig {
    /// Load config from a YAML file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ExtractionConfig = serde_yaml::from_str(&content)?;
        config.check()?;
        Ok(config)
    }

    /// Load config with fallback to default
    pub fn load_with_fallback(path: Option<&str>) -> Self {
        match path {
            Some(p) => Self::load_from_file(p).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {p} ({e}), using defaults");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Reject settings the pipeline cannot work with
    pub fn check(&self) -> Result<()> {
        if self.classifier.dot_leader_min_run < 2 {
            anyhow::bail!("classifier.dot_leader_min_run must be at least 2");
        }
        if self.lessons.reference_content_length == 0 {
            anyhow::bail!("lessons.reference_content_length must be positive");
        }
        if self.scanner.title_max_chars < 4 {
            anyhow::bail!("scanner.title_max_chars must leave room for the ellipsis");
        }
        Ok(())
    }
}

/// Built-in named presets, selectable from the CLI with `--preset`
#[derive(Debug, Clone)]
pub struct ConfigManager {
    presets: HashMap<String, ExtractionConfig>,
    default_config: ExtractionConfig,
}

impl ConfigManager {
    pub fn new() -> Self {
        let mut manager = Self {
            presets: HashMap::new(),
            default_config: ExtractionConfig::default(),
        };
        manager.load_builtin_presets();
        manager
    }

    pub fn get(&self, name: &str) -> Option<&ExtractionConfig> {
        self.presets.get(name)
    }

    pub fn get_or_default(&self, name: &str) -> &ExtractionConfig {
        self.presets.get(name).unwrap_or(&self.default_config)
    }

    pub fn preset_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.presets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn load_builtin_presets(&mut self) {
        self.presets
            .insert("default".to_string(), ExtractionConfig::default());

        // Strict: shorter spans tolerated, more pages treated as noise
        let strict = ExtractionConfig {
            name: "strict".to_string(),
            classifier: ClassifierConfig {
                min_toc_signals: 1,
                dense_leader_lines: 2,
                boilerplate_max_length: 800,
                ..ClassifierConfig::default()
            },
            sessions: SessionConfig {
                default_span: 2,
                anomalous_span_threshold: 6,
                ..SessionConfig::default()
            },
            lessons: LessonConfig {
                min_problem_text_len: 30,
                reference_content_length: 2000,
                synthesize_missing_sessions: true,
            },
            ..ExtractionConfig::default()
        };
        self.presets.insert(strict.name.clone(), strict);

        // Lenient: only the TOC rule runs, long sessions are expected
        let lenient = ExtractionConfig {
            name: "lenient".to_string(),
            classifier: ClassifierConfig {
                rules: vec![
                    RuleConfig::enabled("toc_signals"),
                    RuleConfig {
                        name: "dense_leaders".to_string(),
                        enabled: false,
                    },
                    RuleConfig {
                        name: "boilerplate".to_string(),
                        enabled: false,
                    },
                ],
                ..ClassifierConfig::default()
            },
            sessions: SessionConfig {
                default_span: 4,
                anomalous_span_threshold: 12,
                ..SessionConfig::default()
            },
            lessons: LessonConfig {
                min_problem_text_len: 12,
                reference_content_length: 1000,
                synthesize_missing_sessions: true,
            },
            ..ExtractionConfig::default()
        };
        self.presets.insert(lenient.name.clone(), lenient);
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
