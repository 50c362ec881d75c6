//! Requires a noun-phrase part-of-speech shape.

use pagegraph_shared::ValidatorConfig;

use super::{parse_patterns, render_tags};
use crate::analysis::{Analysis, PosTag};

/// Longest tag sequence the compound-noun fallback accepts.
const MAX_FALLBACK_TOKENS: usize = 4;

#[derive(Debug, Clone)]
pub struct GrammaticalRule {
    patterns: Vec<Vec<PosTag>>,
}

impl GrammaticalRule {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            patterns: parse_patterns(&config.noun_phrase_patterns),
        }
    }

    pub fn check(&self, _text: &str, analysis: &Analysis) -> Result<(), String> {
        let tags = analysis.pos_sequence();
        if tags.is_empty() {
            return Err("no words".into());
        }
        if !analysis
            .content_tokens()
            .any(|t| t.pos.is_nominal() || t.gerund)
        {
            return Err("no noun, proper noun or gerund".into());
        }
        if self.patterns.contains(&tags) {
            return Ok(());
        }

        let ends_on_noun = tags.last().is_some_and(|t| t.is_nominal());
        let clause_free = !tags.iter().any(|t| {
            matches!(
                t,
                PosTag::Verb
                    | PosTag::Aux
                    | PosTag::Pron
                    | PosTag::Det
                    | PosTag::Adp
                    | PosTag::Cconj
                    | PosTag::Sconj
                    | PosTag::Part
                    | PosTag::Sym
            )
        });
        if tags.len() <= MAX_FALLBACK_TOKENS && ends_on_noun && clause_free {
            return Ok(());
        }
        Err(format!("`{}` is not a noun phrase", render_tags(&tags)))
    }
}
