//! Keyword extraction engine: run the extractors, merge their candidates
//! across lexical variants, validate, rank, cap, and link.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use pagegraph_shared::{KeywordConfig, KeywordRelationship, PipelineError, Result, ValidatorConfig};

use crate::analysis::{HeuristicAnalyzer, LinguisticAnalyzer};
use crate::extractors::{
    CoOccurrenceExtractor, EntityExtractor, Extractor, ExtractorKind, RawKeyword,
    TermImportanceExtractor,
};
use crate::normalizer::VariantManager;
use crate::relationships;
use crate::validator::KeywordValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordType {
    Entity,
    Concept,
    Term,
    Custom,
}

impl KeywordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Concept => "concept",
            Self::Term => "term",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for KeywordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A merged, validated canonical keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedKeyword {
    /// Preferred display form.
    pub text: String,
    /// Canonical key; every variant normalizes to it.
    pub normalized: String,
    /// Best contributing extractor score in `0.0..=1.0`.
    pub score: f64,
    pub frequency: usize,
    pub keyword_type: KeywordType,
    pub variants: BTreeSet<String>,
    pub sources: BTreeSet<ExtractorKind>,
    /// Byte offsets into the whitespace-collapsed input.
    pub positions: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_label: Option<String>,
    /// Relationships whose source is this keyword.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<KeywordRelationship>,
}

#[derive(Default)]
struct Merged {
    score: f64,
    frequency_by_source: BTreeMap<ExtractorKind, usize>,
    positions: BTreeSet<usize>,
    entity_label: Option<String>,
}

pub struct KeywordExtractionEngine {
    config: KeywordConfig,
    extractors: Vec<Extractor>,
    validator: KeywordValidator,
}

impl KeywordExtractionEngine {
    /// Engine backed by the built-in [`HeuristicAnalyzer`].
    pub fn new(config: KeywordConfig, validator_config: &ValidatorConfig) -> Self {
        Self::with_analyzer(config, validator_config, Arc::new(HeuristicAnalyzer::new()))
    }

    /// Engine whose entity extractor and validator share `analyzer`.
    pub fn with_analyzer(
        config: KeywordConfig,
        validator_config: &ValidatorConfig,
        analyzer: Arc<dyn LinguisticAnalyzer>,
    ) -> Self {
        let extractors = vec![
            Extractor::CoOccurrence(CoOccurrenceExtractor::new(&config)),
            Extractor::TermImportance(TermImportanceExtractor::new(&config)),
            Extractor::Entity(EntityExtractor::new(&config, Arc::clone(&analyzer))),
        ];
        let validator = KeywordValidator::new(validator_config, analyzer);
        Self::from_parts(config, extractors, validator)
    }

    pub fn from_parts(
        config: KeywordConfig,
        extractors: Vec<Extractor>,
        validator: KeywordValidator,
    ) -> Self {
        Self {
            config,
            extractors,
            validator,
        }
    }

    pub fn config(&self) -> &KeywordConfig {
        &self.config
    }

    /// Extract ranked canonical keywords from `text`.
    ///
    /// Text shorter than `min_text_chars` yields an empty list. A failing
    /// extractor contributes nothing; only the failure of every extractor
    /// is an error.
    #[instrument(skip_all, fields(chars = text.len()))]
    pub fn extract(&self, text: &str) -> Result<Vec<ProcessedKeyword>> {
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.chars().count() < self.config.min_text_chars {
            debug!("text below minimum length; no keywords");
            return Ok(Vec::new());
        }

        let raw = self.run_extractors(&text)?;
        let (variants, merged) = merge(&raw);

        let mut keywords: Vec<ProcessedKeyword> = Vec::new();
        for (key, m) in merged {
            let surfaces = variants.variants(&key);
            if let Some(rejection) = self.validator.explain(surfaces.iter().map(String::as_str)) {
                debug!(keyword = %key, %rejection, "candidate discarded");
                continue;
            }
            let Some(display) = variants.canonical_form(&key) else {
                continue;
            };

            let sources: BTreeSet<ExtractorKind> = m.frequency_by_source.keys().copied().collect();
            let keyword_type = if sources.contains(&ExtractorKind::Entity) {
                KeywordType::Entity
            } else if key.contains(' ') {
                KeywordType::Concept
            } else {
                KeywordType::Term
            };

            keywords.push(ProcessedKeyword {
                text: display,
                score: m.score.clamp(0.0, 1.0),
                // Every extractor counts the same occurrences, so take the largest count.
                frequency: m.frequency_by_source.values().copied().max().unwrap_or(0),
                keyword_type,
                variants: surfaces,
                sources,
                positions: m.positions.into_iter().collect(),
                entity_label: m.entity_label,
                relationships: Vec::new(),
                normalized: key,
            });
        }

        // Score, then canonical key. Frequency only breaks ties while merging.
        keywords.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.normalized.cmp(&b.normalized))
        });
        keywords.truncate(self.config.max_keywords);

        let edges = relationships::infer(&keywords, &text);
        for kw in &mut keywords {
            kw.relationships = edges.iter().filter(|e| e.source == kw.text).cloned().collect();
        }

        debug!(
            candidates = raw.len(),
            accepted = keywords.len(),
            relationships = edges.len(),
            "keyword extraction finished"
        );
        Ok(keywords)
    }

    /// Convenience: every relationship across an extracted keyword list.
    pub fn relationships(keywords: &[ProcessedKeyword]) -> Vec<KeywordRelationship> {
        keywords
            .iter()
            .flat_map(|k| k.relationships.iter().cloned())
            .collect()
    }

    fn run_extractors(&self, text: &str) -> Result<Vec<RawKeyword>> {
        type Outcome = std::thread::Result<Result<Vec<RawKeyword>>>;

        let outcomes: Vec<(ExtractorKind, Outcome)> = if self.config.parallel_extraction {
            std::thread::scope(|s| {
                let handles: Vec<_> = self
                    .extractors
                    .iter()
                    .map(|e| (e.kind(), s.spawn(move || e.extract(text))))
                    .collect();
                handles.into_iter().map(|(k, h)| (k, h.join())).collect()
            })
        } else {
            self.extractors
                .iter()
                .map(|e| (e.kind(), panic::catch_unwind(AssertUnwindSafe(|| e.extract(text)))))
                .collect()
        };

        let mut raw = Vec::new();
        let mut failed = 0;
        for (kind, outcome) in outcomes {
            match outcome {
                Ok(Ok(found)) => {
                    debug!(extractor = %kind, candidates = found.len(), "extractor finished");
                    raw.extend(found);
                }
                Ok(Err(e)) => {
                    warn!(extractor = %kind, error = %e, "extractor failed; contributing no candidates");
                    failed += 1;
                }
                Err(_) => {
                    warn!(extractor = %kind, "extractor panicked; contributing no candidates");
                    failed += 1;
                }
            }
        }

        if failed > 0 && failed == self.extractors.len() {
            return Err(PipelineError::processing("all keyword extractors failed"));
        }
        Ok(raw)
    }
}

fn merge(raw: &[RawKeyword]) -> (VariantManager, BTreeMap<String, Merged>) {
    let mut variants = VariantManager::new();
    let mut merged: BTreeMap<String, Merged> = BTreeMap::new();

    for kw in raw {
        let key = variants.register(&kw.text, kw.frequency, kw.source == ExtractorKind::Entity);
        if key.is_empty() {
            continue;
        }
        let m = merged.entry(key).or_default();
        m.score = m.score.max(kw.score);
        *m.frequency_by_source.entry(kw.source).or_default() += kw.frequency;
        m.positions.extend(kw.positions.iter().copied());
        if m.entity_label.is_none() {
            m.entity_label = kw
                .metadata
                .get("entity_label")
                .and_then(|v| v.as_str())
                .map(str::to_string);
        }
    }
    (variants, merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analysis;
    use crate::normalizer::Normalizer;

    const SENTENCE: &str =
        "Neural networks and deep learning are reshaping machine learning research.";

    fn engine() -> KeywordExtractionEngine {
        KeywordExtractionEngine::new(KeywordConfig::default(), &ValidatorConfig::default())
    }

    fn texts(kws: &[ProcessedKeyword]) -> Vec<&str> {
        kws.iter().map(|k| k.text.as_str()).collect()
    }

    #[test]
    fn surfaces_expected_phrases_and_drops_generic_words() {
        let kws = engine().extract(SENTENCE).unwrap();
        let found = texts(&kws);
        for expected in ["neural networks", "deep learning", "machine learning"] {
            let kw = kws.iter().find(|k| k.text == expected);
            assert!(kw.is_some(), "missing {expected}: {found:?}");
            assert_eq!(kw.unwrap().score, 1.0);
        }
        assert!(!found.contains(&"research"));
    }

    #[test]
    fn extracts_entities() {
        let kws = engine().extract("John Smith works at Acme Corp").unwrap();
        for name in ["John Smith", "Acme Corp"] {
            let kw = kws.iter().find(|k| k.text == name).unwrap_or_else(|| {
                panic!("missing {name}: {:?}", texts(&kws));
            });
            assert_eq!(kw.keyword_type, KeywordType::Entity);
            assert!(kw.sources.contains(&ExtractorKind::Entity));
        }
        let acme = kws.iter().find(|k| k.text == "Acme Corp").unwrap();
        assert_eq!(acme.entity_label.as_deref(), Some("ORG"));
    }

    #[test]
    fn deterministic_across_runs_and_modes() {
        let parallel = engine().extract(SENTENCE).unwrap();
        assert_eq!(parallel, engine().extract(SENTENCE).unwrap());

        let sequential = KeywordExtractionEngine::new(
            KeywordConfig {
                parallel_extraction: false,
                ..KeywordConfig::default()
            },
            &ValidatorConfig::default(),
        )
        .extract(SENTENCE)
        .unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn variants_normalize_to_canonical_key() {
        let kws = engine()
            .extract("Search engines crawl pages. A search engine ranks pages quickly.")
            .unwrap();
        for kw in &kws {
            assert_eq!(Normalizer::normalize(&kw.text), kw.normalized);
            for v in &kw.variants {
                assert_eq!(Normalizer::normalize(v), kw.normalized);
            }
        }
        let keys: BTreeSet<&str> = kws.iter().map(|k| k.normalized.as_str()).collect();
        assert_eq!(keys.len(), kws.len());
    }

    #[test]
    fn ranking_is_sorted_and_capped() {
        let config = KeywordConfig {
            max_keywords: 3,
            ..KeywordConfig::default()
        };
        let kws = KeywordExtractionEngine::new(config, &ValidatorConfig::default())
            .extract(SENTENCE)
            .unwrap();
        assert_eq!(kws.len(), 3);
        for pair in kws.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn equal_scores_rank_lexically() {
        let kws = engine()
            .extract("Zebra crossings help. Zebra crossings help. Apple orchards grow.")
            .unwrap();
        assert!(kws.len() > 1);
        for pair in kws.windows(2) {
            if pair[0].score == pair[1].score {
                assert!(
                    pair[0].normalized < pair[1].normalized,
                    "{:?} ranked before {:?}",
                    pair[0].normalized,
                    pair[1].normalized
                );
            }
        }
    }

    #[test]
    fn repeated_mentions_are_counted_once_per_occurrence() {
        let text = format!("{SENTENCE} {SENTENCE}");
        let kws = engine().extract(&text).unwrap();
        let deep = kws.iter().find(|k| k.text == "deep learning").unwrap();
        assert!(deep.sources.len() > 1);
        assert_eq!(deep.frequency, 2);
    }

    #[test]
    fn short_text_yields_nothing() {
        assert!(engine().extract("too short").unwrap().is_empty());
    }

    #[test]
    fn keywords_carry_relationships() {
        let kws = engine().extract(SENTENCE).unwrap();
        let all = KeywordExtractionEngine::relationships(&kws);
        assert!(!all.is_empty());
        assert!(all.iter().all(|r| r.source != r.target));
        let learning = kws.iter().find(|k| k.text == "learning").unwrap();
        assert!(
            learning
                .relationships
                .iter()
                .any(|r| r.target == "deep learning")
        );
    }

    struct FailingAnalyzer;

    impl LinguisticAnalyzer for FailingAnalyzer {
        fn analyze(&self, _text: &str) -> Result<Analysis> {
            Err(PipelineError::processing("analyzer offline"))
        }
    }

    fn heuristic_validator() -> KeywordValidator {
        KeywordValidator::new(&ValidatorConfig::default(), Arc::new(HeuristicAnalyzer::new()))
    }

    #[test]
    fn failing_extractor_is_contained() {
        let config = KeywordConfig::default();
        let extractors = vec![
            Extractor::CoOccurrence(CoOccurrenceExtractor::new(&config)),
            Extractor::TermImportance(TermImportanceExtractor::new(&config)),
            Extractor::Entity(EntityExtractor::new(&config, Arc::new(FailingAnalyzer))),
        ];
        let engine = KeywordExtractionEngine::from_parts(config, extractors, heuristic_validator());
        let kws = engine.extract(SENTENCE).unwrap();
        assert!(texts(&kws).contains(&"deep learning"));
    }

    #[test]
    fn all_extractors_failing_is_an_error() {
        let config = KeywordConfig::default();
        let extractors = vec![Extractor::Entity(EntityExtractor::new(
            &config,
            Arc::new(FailingAnalyzer),
        ))];
        let engine = KeywordExtractionEngine::from_parts(config, extractors, heuristic_validator());
        let err = engine.extract(SENTENCE).unwrap_err();
        assert!(matches!(err, PipelineError::Processing(_)));
    }
}
