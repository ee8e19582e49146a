use crate::config::ClassifierConfig;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static TOC_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btable\s+of\s+contents\b").unwrap());

// A line holding nothing but "Unit A" / "UNIT 3": TOC section headers
static ISOLATED_UNIT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*unit[ \t]+[a-z0-9]{1,2}[ \t]*$").unwrap());

static LESSON_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blesson\s+\d+").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NoiseReason {
    TableOfContents { signals: usize },
    DenseLeaders { lines: usize },
    Boilerplate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PageClass {
    Content,
    Noise(NoiseReason),
}

impl PageClass {
    pub fn is_content(&self) -> bool {
        matches!(self, PageClass::Content)
    }
}

/// A noise rule: a pure predicate over one page's text.
type NoiseRule = fn(&PageClassifier, &str) -> Option<NoiseReason>;

fn rule_by_name(name: &str) -> Option<NoiseRule> {
    match name {
        "toc_signals" => Some(PageClassifier::toc_signals),
        "dense_leaders" => Some(PageClassifier::dense_leaders),
        "boilerplate" => Some(PageClassifier::boilerplate),
        _ => None,
    }
}

/// Labels a page as lesson content or noise (TOC, front matter, boilerplate).
///
/// Deliberately conservative: a noise page that slips through costs little
/// downstream, a dropped lesson page cannot be recovered.
pub struct PageClassifier {
    rules: Vec<(String, NoiseRule)>,
    dot_leader: Regex,
    config: ClassifierConfig,
}

impl PageClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let mut rules = Vec::new();
        for rule in &config.rules {
            if !rule.enabled {
                tracing::debug!("Skipping disabled page rule: {}", rule.name);
                continue;
            }
            match rule_by_name(&rule.name) {
                Some(f) => rules.push((rule.name.clone(), f)),
                None => tracing::warn!("Unknown page rule '{}' ignored", rule.name),
            }
        }

        let run = config.dot_leader_min_run.max(2);
        // Solid leaders ("......") and spaced ones (". . . . .")
        let dot_leader = Regex::new(&format!(r"\.{{{run},}}|(?:\.[ \t]){{{},}}\.", run - 1))
            .unwrap_or_else(|_| Regex::new(r"\.{5,}").unwrap());

        Self {
            rules,
            dot_leader,
            config: config.clone(),
        }
    }

    pub fn classify(&self, page_text: &str) -> PageClass {
        for (name, rule) in &self.rules {
            if let Some(reason) = rule(self, page_text) {
                tracing::debug!("Page matched noise rule {name}: {reason:?}");
                return PageClass::Noise(reason);
            }
        }
        PageClass::Content
    }

    fn toc_signals(&self, text: &str) -> Option<NoiseReason> {
        let signals = [
            TOC_PHRASE.is_match(text),
            self.dot_leader.is_match(text),
            ISOLATED_UNIT_LINE.is_match(text),
        ]
        .iter()
        .filter(|hit| **hit)
        .count();

        (signals >= self.config.min_toc_signals).then_some(NoiseReason::TableOfContents { signals })
    }

    fn dense_leaders(&self, text: &str) -> Option<NoiseReason> {
        let lines = text
            .lines()
            .filter(|line| self.dot_leader.is_match(line))
            .count();
        (lines > self.config.dense_leader_lines).then_some(NoiseReason::DenseLeaders { lines })
    }

    fn boilerplate(&self, text: &str) -> Option<NoiseReason> {
        let trimmed = text.trim();
        if trimmed.chars().count() >= self.config.boilerplate_max_length {
            return None;
        }
        // Short lesson pages carry a copyright footer too
        if LESSON_MENTION.is_match(trimmed) {
            return None;
        }
        let lower = trimmed.to_lowercase();
        self.config
            .boilerplate_phrases
            .iter()
            .any(|phrase| lower.contains(phrase.as_str()))
            .then_some(NoiseReason::Boilerplate)
    }
}

impl Default for PageClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}
