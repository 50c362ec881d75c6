//! Keyword candidate extraction strategies.
//!
//! The strategy set is closed: [`Extractor`] wraps each implementation and
//! dispatches through a single `match`. Every strategy produces
//! [`RawKeyword`]s whose scores are only comparable within that strategy.

pub mod cooccurrence;
pub mod entity;
pub mod term_importance;

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use pagegraph_shared::Result;

pub use cooccurrence::CoOccurrenceExtractor;
pub use entity::EntityExtractor;
pub use term_importance::TermImportanceExtractor;

/// Tag identifying which strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExtractorKind {
    #[serde(rename = "cooccurrence")]
    CoOccurrence,
    #[serde(rename = "term_importance")]
    TermImportance,
    #[serde(rename = "entity")]
    Entity,
}

impl ExtractorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoOccurrence => "cooccurrence",
            Self::TermImportance => "term_importance",
            Self::Entity => "entity",
        }
    }
}

impl std::fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated candidate emitted by one extractor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawKeyword {
    pub text: String,
    /// Extractor-local score in `0.0..=1.0`.
    pub score: f64,
    pub source: ExtractorKind,
    pub frequency: usize,
    /// Byte offsets of each occurrence in the input text.
    pub positions: Vec<usize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// One of the three extraction strategies.
pub enum Extractor {
    CoOccurrence(CoOccurrenceExtractor),
    TermImportance(TermImportanceExtractor),
    Entity(EntityExtractor),
}

impl Extractor {
    pub fn kind(&self) -> ExtractorKind {
        match self {
            Self::CoOccurrence(_) => ExtractorKind::CoOccurrence,
            Self::TermImportance(_) => ExtractorKind::TermImportance,
            Self::Entity(_) => ExtractorKind::Entity,
        }
    }

    pub fn extract(&self, text: &str) -> Result<Vec<RawKeyword>> {
        match self {
            Self::CoOccurrence(e) => e.extract(text),
            Self::TermImportance(e) => e.extract(text),
            Self::Entity(e) => e.extract(text),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared segmentation
// ---------------------------------------------------------------------------

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}]+(?:['’\-][\p{L}\p{N}]+)*").expect("valid regex")
});

/// A lowercased content word and its byte offset.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Word {
    pub text: String,
    pub start: usize,
}

/// Split text into runs of content words.
///
/// A run ends at a stop word, a purely numeric token, or any non-whitespace
/// character between two words (punctuation, brackets, symbols).
pub(crate) fn segments(text: &str, stop_words: &HashSet<String>) -> Vec<Vec<Word>> {
    let mut out: Vec<Vec<Word>> = Vec::new();
    let mut current: Vec<Word> = Vec::new();
    let mut last_end = 0;

    for m in WORD_RE.find_iter(text) {
        let gap = &text[last_end..m.start()];
        last_end = m.end();
        if gap.chars().any(|c| !c.is_whitespace()) && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }

        let lower = m.as_str().to_lowercase();
        if stop_words.contains(&lower) || lower.chars().all(|c| c.is_numeric()) {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(Word {
            text: lower,
            start: m.start(),
        });
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

pub(crate) fn join_words(words: &[Word]) -> String {
    words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Apply an extractor's local frequency and score thresholds.
pub(crate) fn passes_thresholds(kw: &RawKeyword, min_frequency: usize, min_score: f64) -> bool {
    kw.frequency >= min_frequency && kw.score >= min_score && kw.score > 0.0
}
