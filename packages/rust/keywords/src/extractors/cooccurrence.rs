//! Co-occurrence (RAKE-style) phrase scoring.
//!
//! Each content word scores `degree / frequency`, where degree counts the
//! words it shares a phrase with (itself included). A phrase scores the mean
//! of its word scores, normalised against the best phrase.

use std::collections::{BTreeMap, HashSet};

use pagegraph_shared::{KeywordConfig, Result};

use super::{ExtractorKind, RawKeyword, join_words, passes_thresholds, segments};

#[derive(Debug, Clone)]
pub struct CoOccurrenceExtractor {
    stop_words: HashSet<String>,
    max_words: usize,
    min_frequency: usize,
    min_score: f64,
}

#[derive(Default)]
struct WordStats {
    frequency: usize,
    degree: usize,
}

impl CoOccurrenceExtractor {
    pub fn new(config: &KeywordConfig) -> Self {
        Self {
            stop_words: config.stop_words.iter().map(|w| w.to_lowercase()).collect(),
            max_words: config.max_words.max(1),
            min_frequency: config.min_frequency,
            min_score: config.min_score,
        }
    }

    pub fn extract(&self, text: &str) -> Result<Vec<RawKeyword>> {
        let phrases = segments(text, &self.stop_words);

        // Degrees come from every phrase, including ones too long to keep.
        let mut stats: BTreeMap<&str, WordStats> = BTreeMap::new();
        for phrase in &phrases {
            for word in phrase {
                let s = stats.entry(word.text.as_str()).or_default();
                s.frequency += 1;
                s.degree += phrase.len();
            }
        }

        let mut candidates: BTreeMap<String, (f64, Vec<usize>)> = BTreeMap::new();
        for phrase in phrases.iter().filter(|p| p.len() <= self.max_words) {
            let score = phrase
                .iter()
                .map(|w| {
                    let s = &stats[w.text.as_str()];
                    s.degree as f64 / s.frequency as f64
                })
                .sum::<f64>()
                / phrase.len() as f64;
            let entry = candidates
                .entry(join_words(phrase))
                .or_insert((score, Vec::new()));
            entry.1.push(phrase[0].start);
        }

        let best = candidates
            .values()
            .map(|(score, _)| *score)
            .fold(0.0_f64, f64::max);
        if best <= 0.0 {
            return Ok(Vec::new());
        }

        Ok(candidates
            .into_iter()
            .map(|(text, (score, positions))| RawKeyword {
                text,
                score: score / best,
                source: ExtractorKind::CoOccurrence,
                frequency: positions.len(),
                positions,
                metadata: BTreeMap::new(),
            })
            .filter(|kw| passes_thresholds(kw, self.min_frequency, self.min_score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> CoOccurrenceExtractor {
        CoOccurrenceExtractor::new(&KeywordConfig::default())
    }

    fn score_of(kws: &[RawKeyword], text: &str) -> Option<f64> {
        kws.iter().find(|k| k.text == text).map(|k| k.score)
    }

    #[test]
    fn scores_phrases_by_mean_degree() {
        let kws = extractor()
            .extract("Neural networks and deep learning are reshaping machine learning research.")
            .unwrap();

        // learning: frequency 2, degree 2 + 4 => 3.0; deep learning = 2.5, neural networks = 2.0
        assert_eq!(score_of(&kws, "deep learning"), Some(1.0));
        assert_eq!(score_of(&kws, "neural networks"), Some(0.8));
        // four words exceeds max_words = 3
        assert!(score_of(&kws, "reshaping machine learning research").is_none());
        assert!(kws.iter().all(|k| k.source == ExtractorKind::CoOccurrence));
    }

    #[test]
    fn repeated_phrases_accumulate_positions() {
        let kws = extractor().extract("Rust crates, Rust crates.").unwrap();
        assert_eq!(kws.len(), 1);
        assert_eq!(kws[0].text, "rust crates");
        assert_eq!(kws[0].frequency, 2);
        assert_eq!(kws[0].positions, vec![0, 13]);
    }

    #[test]
    fn min_frequency_filters_single_mentions() {
        let config = KeywordConfig {
            min_frequency: 2,
            ..KeywordConfig::default()
        };
        let kws = CoOccurrenceExtractor::new(&config)
            .extract("Vector search is fast. Vector search is cheap. Graphs are slow.")
            .unwrap();
        let texts: Vec<&str> = kws.iter().map(|k| k.text.as_str()).collect();
        assert_eq!(texts, vec!["vector search"]);
        assert_eq!(kws[0].frequency, 2);
        assert_eq!(kws[0].positions, vec![0, 23]);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(extractor().extract("").unwrap().is_empty());
        assert!(extractor().extract("the and of").unwrap().is_empty());
    }
}
