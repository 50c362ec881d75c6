//! Named-entity candidates.
//!
//! Mentions are grouped by normalized text; the score grows linearly with
//! mention count from a base value and is capped at 1.0. Numeric and
//! temporal entity categories are never candidates.

use std::collections::BTreeMap;
use std::sync::Arc;

use pagegraph_shared::{KeywordConfig, Result};

use super::{ExtractorKind, RawKeyword, passes_thresholds};
use crate::analysis::{EntityLabel, LinguisticAnalyzer};
use crate::normalizer::Normalizer;

pub struct EntityExtractor {
    analyzer: Arc<dyn LinguisticAnalyzer>,
    max_words: usize,
    base_score: f64,
    frequency_step: f64,
    min_frequency: usize,
    min_score: f64,
}

struct Mentions {
    surface: String,
    label: EntityLabel,
    positions: Vec<usize>,
}

impl EntityExtractor {
    pub fn new(config: &KeywordConfig, analyzer: Arc<dyn LinguisticAnalyzer>) -> Self {
        Self {
            analyzer,
            max_words: config.max_words.max(1),
            base_score: config.entity_base_score,
            frequency_step: config.entity_frequency_step,
            min_frequency: config.min_frequency,
            min_score: config.min_score,
        }
    }

    pub fn extract(&self, text: &str) -> Result<Vec<RawKeyword>> {
        let analysis = self.analyzer.analyze(text)?;

        let mut groups: BTreeMap<String, Mentions> = BTreeMap::new();
        for entity in &analysis.entities {
            if entity.label.is_numeric_or_temporal() {
                continue;
            }
            let surface = entity.span.text.split_whitespace().collect::<Vec<_>>().join(" ");
            if surface.split(' ').count() > self.max_words {
                continue;
            }
            let key = Normalizer::normalize(&surface);
            if key.is_empty() {
                continue;
            }
            groups
                .entry(key)
                .or_insert_with(|| Mentions {
                    surface,
                    label: entity.label,
                    positions: Vec::new(),
                })
                .positions
                .push(entity.span.start);
        }

        Ok(groups
            .into_values()
            .map(|m| {
                let frequency = m.positions.len();
                let score = self.base_score + self.frequency_step * (frequency as f64 - 1.0);
                let mut metadata = BTreeMap::new();
                metadata.insert(
                    "entity_label".to_string(),
                    serde_json::Value::from(m.label.as_str()),
                );
                RawKeyword {
                    text: m.surface,
                    score: score.clamp(0.0, 1.0),
                    source: ExtractorKind::Entity,
                    frequency,
                    positions: m.positions,
                    metadata,
                }
            })
            .filter(|kw| passes_thresholds(kw, self.min_frequency, self.min_score))
            .collect())
    }
}
