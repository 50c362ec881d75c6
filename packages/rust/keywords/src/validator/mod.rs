//! Keyword acceptance filter.
//!
//! A candidate is accepted only if every rule accepts every one of its
//! lexical variants. Rules are pure functions of `(text, analysis)` plus
//! their own configuration, so checking stops at the first rejection.

pub mod code_pattern;
pub mod grammatical;
pub mod semantic;
pub mod text_pattern;

use std::sync::Arc;

use tracing::{debug, warn};

use pagegraph_shared::ValidatorConfig;

use crate::analysis::{Analysis, LinguisticAnalyzer, PosTag};

pub use code_pattern::CodePatternRule;
pub use grammatical::GrammaticalRule;
pub use semantic::SemanticRule;
pub use text_pattern::TextPatternRule;

/// The fixed rule set, checked in declaration order.
#[derive(Debug, Clone)]
pub enum ValidationRule {
    CodePattern(CodePatternRule),
    Grammatical(GrammaticalRule),
    TextPattern(TextPatternRule),
    Semantic(SemanticRule),
}

impl ValidationRule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CodePattern(_) => "code_pattern",
            Self::Grammatical(_) => "grammatical",
            Self::TextPattern(_) => "text_pattern",
            Self::Semantic(_) => "semantic",
        }
    }

    /// `Err(reason)` when the rule rejects `text`.
    pub fn check(&self, text: &str, analysis: &Analysis) -> Result<(), String> {
        match self {
            Self::CodePattern(r) => r.check(text, analysis),
            Self::Grammatical(r) => r.check(text, analysis),
            Self::TextPattern(r) => r.check(text, analysis),
            Self::Semantic(r) => r.check(text, analysis),
        }
    }
}

/// Why a candidate was turned down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub rule: &'static str,
    pub variant: String,
    pub reason: String,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} rejected {:?}: {}", self.rule, self.variant, self.reason)
    }
}

pub struct KeywordValidator {
    analyzer: Arc<dyn LinguisticAnalyzer>,
    rules: Vec<ValidationRule>,
}

impl KeywordValidator {
    pub fn new(config: &ValidatorConfig, analyzer: Arc<dyn LinguisticAnalyzer>) -> Self {
        Self {
            analyzer,
            rules: vec![
                ValidationRule::CodePattern(CodePatternRule::new(config)),
                ValidationRule::Grammatical(GrammaticalRule::new(config)),
                ValidationRule::TextPattern(TextPatternRule::new(config)),
                ValidationRule::Semantic(SemanticRule::new(config)),
            ],
        }
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    /// Validate a single surface form.
    pub fn is_valid(&self, candidate: &str) -> bool {
        self.explain([candidate]).is_none()
    }

    /// Validate a canonical keyword through all of its variants.
    pub fn accepts_all<'a>(&self, variants: impl IntoIterator<Item = &'a str>) -> bool {
        self.explain(variants).is_none()
    }

    /// First rejection across `variants`, or `None` if all are accepted.
    pub fn explain<'a>(&self, variants: impl IntoIterator<Item = &'a str>) -> Option<Rejection> {
        for variant in variants {
            let analysis = match self.analyzer.analyze(variant) {
                Ok(a) => a,
                Err(e) => {
                    warn!(variant, error = %e, "linguistic analysis failed during validation");
                    return Some(Rejection {
                        rule: "analysis",
                        variant: variant.to_string(),
                        reason: e.to_string(),
                    });
                }
            };
            for rule in &self.rules {
                if let Err(reason) = rule.check(variant, &analysis) {
                    debug!(variant, rule = rule.name(), %reason, "keyword rejected");
                    return Some(Rejection {
                        rule: rule.name(),
                        variant: variant.to_string(),
                        reason,
                    });
                }
            }
        }
        None
    }
}

/// Parse space-separated tag patterns (`"ADJ NOUN"`), dropping malformed ones.
pub(crate) fn parse_patterns(patterns: &[String]) -> Vec<Vec<PosTag>> {
    patterns
        .iter()
        .filter_map(|p| {
            let tags: Option<Vec<PosTag>> = p.split_whitespace().map(PosTag::parse).collect();
            match tags {
                Some(t) if !t.is_empty() => Some(t),
                _ => {
                    warn!(pattern = %p, "ignoring malformed part-of-speech pattern");
                    None
                }
            }
        })
        .collect()
}

pub(crate) fn render_tags(tags: &[PosTag]) -> String {
    tags.iter().map(PosTag::as_str).collect::<Vec<_>>().join(" ")
}
