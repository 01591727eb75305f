//! MailGrader core pipeline.
//! Aligns tag-annotated generator output back onto a live editable text
//! surface, drives animated overlay decorations, and reconciles rewrite
//! pairs into an aligned original-vs-improved view.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod diffview;
pub mod extract;
pub mod handoff;
pub mod matching;
pub mod orchestrate;
pub mod overlay;
pub mod reconcile;
pub mod surface;

pub use diffview::{DiffRow, DiffView, FrameMessage, RowMarker, Side};
pub use extract::{extract, rewrap};
pub use handoff::{HandoffPayload, HandoffStore};
pub use matching::UnitMatch;
pub use orchestrate::{HighlightOutcome, Session, SessionState};
pub use overlay::{DecorationHandle, OverlayLayer};
pub use reconcile::{
    align_units, parse_pairs, parse_pairs_strict, reconstruct, DiffKind, DiffUnit, DraftPair,
    MarkedDocument,
};
pub use surface::{EditorSurface, Rect, SurfaceMetrics};

/// Placeholder shown in an empty editor; input equal to it is not analyzed.
pub const PLACEHOLDER_TEXT: &str = "type something, what are you waiting for?";

/// Timer durations for the debounce, queue pacing, and enter animation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub debounce_ms: u64,
    pub queue_delay_ms: u64,
    pub animation_duration_ms: u64,
    pub animation_step_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            queue_delay_ms: 200,
            animation_duration_ms: 600,
            animation_step_ms: 16,
        }
    }
}

/// Thresholds for the word-overlap matching heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRules {
    /// A candidate unit is accepted only when its score is strictly above this.
    pub accept_threshold: f32,
    /// Words longer than this many characters count as significant.
    pub significant_word_len: usize,
    /// Targets with fewer significant words than this are refused outright.
    pub min_significant_words: usize,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            accept_threshold: 0.5,
            significant_word_len: 3,
            min_significant_words: 2,
        }
    }
}

/// Companion service endpoints and the hand-off size budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Services {
    pub base_url: String,
    /// Payloads larger than this many bytes are handed off via the server
    /// store instead of the local key-value tier.
    pub handoff_size_budget: usize,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".into(),
            handoff_size_budget: 64 * 1024,
        }
    }
}

/// Where the durable hand-off tier lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HandoffConfig {
    /// Defaults to `mailgrader-handoff.json` under the temp directory.
    pub durable_path: Option<PathBuf>,
}

/// Top-level configuration for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub timings: Timings,
    pub matching: MatchRules,
    pub services: Services,
    pub handoff: HandoffConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let config = serde_yaml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Missing config file falls back to defaults; a malformed one is an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Judgment categories the generator can attach to a span.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Fluff,
    SpamWords,
    HardToRead,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Fluff, Category::SpamWords, Category::HardToRead];

    /// Wire name used inside the generator's inline tags.
    pub fn tag_name(self) -> &'static str {
        match self {
            Category::Fluff => "fluff",
            Category::SpamWords => "spam_words",
            Category::HardToRead => "hard_to_read",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Category> {
        let tag = tag.trim().to_ascii_lowercase();
        Category::ALL.into_iter().find(|c| c.tag_name() == tag)
    }

    /// Fixed mapping from judgment to visual treatment.
    pub fn style(self) -> HighlightStyle {
        match self {
            Category::Fluff => HighlightStyle::Good,
            Category::SpamWords => HighlightStyle::Warning,
            Category::HardToRead => HighlightStyle::Danger,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag_name())
    }
}

/// Visual severity tiers for decorations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum HighlightStyle {
    Good,
    Warning,
    Danger,
}

impl HighlightStyle {
    pub fn class_name(self) -> &'static str {
        match self {
            HighlightStyle::Good => "highlight-good",
            HighlightStyle::Warning => "highlight-warning",
            HighlightStyle::Danger => "highlight-danger",
        }
    }
}

/// A span of text the generator flagged, with its judgment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaggedSpan {
    pub category: Category,
    pub text: String,
}

impl TaggedSpan {
    /// Session-scoped identity used to skip spans already rendered.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.category, self.text)
    }
}

/// Failures that must reach the caller; per-span failures stay local.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no draft pairs found in the fixer response")]
    NoPairs,
    #[error("editor surface cannot be laid out: {0}")]
    Layout(String),
}

/// True when the buffer holds real user input worth analyzing.
pub fn should_analyze(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed != PLACEHOLDER_TEXT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_tags_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_tag(category.tag_name()), Some(category));
        }
        assert_eq!(Category::from_tag("SPAM_WORDS"), Some(Category::SpamWords));
        assert_eq!(Category::from_tag("bold_claim"), None);
    }

    #[test]
    fn styles_are_fixed_per_category() {
        assert_eq!(Category::Fluff.style(), HighlightStyle::Good);
        assert_eq!(Category::SpamWords.style(), HighlightStyle::Warning);
        assert_eq!(Category::HardToRead.style(), HighlightStyle::Danger);
        assert_eq!(HighlightStyle::Danger.class_name(), "highlight-danger");
    }

    #[test]
    fn placeholder_is_not_analyzable() {
        assert!(!should_analyze(""));
        assert!(!should_analyze("   \n"));
        assert!(!should_analyze(PLACEHOLDER_TEXT));
        assert!(should_analyze("A real draft."));
    }

    #[test]
    fn config_defaults_match_contract() {
        let config = Config::default();
        assert_eq!(config.timings.debounce_ms, 1000);
        assert_eq!(config.timings.animation_duration_ms, 600);
        assert_eq!(config.timings.animation_step_ms, 16);
        assert!((config.matching.accept_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.matching.min_significant_words, 2);
    }

    #[test]
    fn config_parses_partial_yaml() {
        let config: Config = serde_yaml::from_str("timings:\n  debounce_ms: 250\n").unwrap();
        assert_eq!(config.timings.debounce_ms, 250);
        assert_eq!(config.timings.queue_delay_ms, 200);
    }

    #[test]
    fn dedup_key_joins_category_and_text() {
        let span = TaggedSpan {
            category: Category::Fluff,
            text: "Be consistent.".into(),
        };
        assert_eq!(span.dedup_key(), "fluff:Be consistent.");
    }
}
