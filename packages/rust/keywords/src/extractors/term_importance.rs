//! Term-importance scoring over n-grams.
//!
//! `score = (count / total_words) * length_factor * scale`, clamped to 1.0.
//! Single words get half weight, two-word phrases three quarters, and
//! phrases of three or more words full weight.

use std::collections::{BTreeMap, HashSet};

use pagegraph_shared::{KeywordConfig, Result};

use super::{ExtractorKind, RawKeyword, join_words, passes_thresholds, segments};

/// Single words too common to be worth keeping on their own.
const COMMON_WORDS: &[&str] = &[
    "able", "across", "actually", "already", "another", "around", "back", "best", "better",
    "come", "day", "different", "done", "easy", "end", "enough", "get", "gets", "given", "go",
    "going", "good", "got", "great", "help", "here", "high", "important", "just", "keep",
    "know", "last", "like", "little", "long", "look", "lot", "lots", "made", "make", "makes",
    "many", "new", "next", "old", "one", "part", "place", "put", "really", "right", "said",
    "say", "see", "set", "show", "small", "start", "still", "take", "thing", "things", "think",
    "today", "two", "use", "used", "uses", "using", "want", "way", "ways", "well", "whole",
];

#[derive(Debug, Clone)]
pub struct TermImportanceExtractor {
    stop_words: HashSet<String>,
    max_words: usize,
    scale: f64,
    min_frequency: usize,
    min_score: f64,
}

impl TermImportanceExtractor {
    pub fn new(config: &KeywordConfig) -> Self {
        Self {
            stop_words: config.stop_words.iter().map(|w| w.to_lowercase()).collect(),
            max_words: config.max_words.max(1),
            scale: config.term_score_scale,
            min_frequency: config.min_frequency,
            min_score: config.min_score,
        }
    }

    pub fn extract(&self, text: &str) -> Result<Vec<RawKeyword>> {
        let segs = segments(text, &self.stop_words);
        let total: usize = segs.iter().map(Vec::len).sum();
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut counts: BTreeMap<String, (usize, Vec<usize>)> = BTreeMap::new();
        for seg in &segs {
            for n in 1..=self.max_words.min(seg.len()) {
                for window in seg.windows(n) {
                    let entry = counts.entry(join_words(window)).or_default();
                    entry.0 += 1;
                    entry.1.push(window[0].start);
                }
            }
        }

        Ok(counts
            .into_iter()
            .filter(|(phrase, _)| is_meaningful(phrase))
            .map(|(phrase, (count, positions))| {
                let words = phrase.split(' ').count();
                let tf = count as f64 / total as f64;
                RawKeyword {
                    score: (tf * length_factor(words) * self.scale).clamp(0.0, 1.0),
                    text: phrase,
                    source: ExtractorKind::TermImportance,
                    frequency: count,
                    positions,
                    metadata: BTreeMap::new(),
                }
            })
            .filter(|kw| passes_thresholds(kw, self.min_frequency, self.min_score))
            .collect())
    }
}

fn length_factor(words: usize) -> f64 {
    match words {
        0 | 1 => 0.5,
        2 => 0.75,
        _ => 1.0,
    }
}

/// Multi-word phrases always pass; single words must be longer than two
/// characters, non-numeric and not a common filler word.
fn is_meaningful(phrase: &str) -> bool {
    if phrase.contains(' ') {
        return true;
    }
    phrase.chars().count() >= 3
        && !phrase.chars().any(|c| c.is_numeric())
        && !COMMON_WORDS.contains(&phrase)
}
