//! Filters temporal/quantity expressions and vague generic terms.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use pagegraph_shared::ValidatorConfig;

use super::parse_patterns;
use crate::analysis::{Analysis, DepRole, PosTag};
use crate::normalizer::Normalizer;

static TEMPORAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \b(?:january|february|march|april|may|june|july|august|september|october|november|december)\b
        | \b(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday)s?\b
        | \b(?:yesterday|today|tomorrow|tonight|nowadays)\b
        | \b(?:last|next|this|past|coming)\s+(?:week|month|year|decade|century|weekend|quarter)s?\b
        | \b(?:days?|weeks?|months?|years?|hours?|minutes?)\s+ago\b
        | \b(?:recently|currently|annually|weekly|daily|monthly)\b",
    )
    .expect("valid regex")
});

static QUANTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*(?:\d+|a\s+few|few|several|many|dozens?|hundreds?|thousands?|millions?
            |one|two|three|four|five|six|seven|eight|nine|ten)
        \s+(?:seconds?|minutes?|hours?|days?|weeks?|months?|years?|times|items?|steps?
            |ways?|things?|people|persons?|percent|units?|pieces?|pages?|tips?|reasons?)\b",
    )
    .expect("valid regex")
});

static SMALL_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:first|second|third|fourth|fifth|sixth|seventh|eighth|ninth|one|two|three|four|five|six|seven|eight|nine|[0-9])\b",
    )
    .expect("valid regex")
});

#[derive(Debug, Clone)]
pub struct SemanticRule {
    generic_terms: HashSet<String>,
    compound_patterns: Vec<Vec<PosTag>>,
}

impl SemanticRule {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            generic_terms: config.generic_terms.iter().map(|w| w.to_lowercase()).collect(),
            compound_patterns: parse_patterns(&config.compound_patterns),
        }
    }

    fn is_generic(&self, word: &str) -> bool {
        self.generic_terms.contains(word) || self.generic_terms.contains(&Normalizer::normalize(word))
    }

    fn is_meaningful_compound(&self, analysis: &Analysis) -> bool {
        analysis.entity_spanning_all().is_some()
            || analysis.is_single_noun_chunk()
            || analysis.has_dep(DepRole::Compound)
            || self.compound_patterns.contains(&analysis.pos_sequence())
    }

    pub fn check(&self, text: &str, analysis: &Analysis) -> Result<(), String> {
        if TEMPORAL_RE.is_match(text) {
            return Err("temporal expression".into());
        }
        if QUANTITY_RE.is_match(text) {
            return Err("counted quantity".into());
        }
        if SMALL_NUMBER_RE.is_match(text) {
            return Err("ordinal or small cardinal".into());
        }

        let lower = text.to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();
        match words.as_slice() {
            [single] if self.is_generic(single) => {
                return Err(format!("`{single}` is too generic on its own"));
            }
            [_] => {}
            _ => {
                if words.iter().any(|w| self.is_generic(w)) && !self.is_meaningful_compound(analysis)
                {
                    return Err("generic term outside a meaningful compound".into());
                }
            }
        }

        if let Some(entity) = analysis
            .entities
            .iter()
            .find(|e| e.label.is_numeric_or_temporal())
        {
            return Err(format!("{} entity `{}`", entity.label.as_str(), entity.span.text));
        }
        Ok(())
    }
}
