//! Surface-level shape checks: length, forbidden words, markup residue and
//! function-word roles.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use pagegraph_shared::ValidatorConfig;

use crate::analysis::{Analysis, DepRole, PosTag};

static BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[()\[\]{}<>]").expect("valid regex"));

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:https?://|www\.)|\b[a-z0-9-]+\.(?:com|org|net|io|dev|edu|gov|html?)\b")
        .expect("valid regex")
});

#[derive(Debug, Clone)]
pub struct TextPatternRule {
    max_words: usize,
    min_word_length: usize,
    forbidden_start_words: HashSet<String>,
    question_words: HashSet<String>,
}

impl TextPatternRule {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            max_words: config.max_words,
            min_word_length: config.min_word_length,
            forbidden_start_words: config
                .forbidden_start_words
                .iter()
                .map(|w| w.to_lowercase())
                .collect(),
            question_words: config.question_words.iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    pub fn check(&self, text: &str, analysis: &Analysis) -> Result<(), String> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();

        if words.is_empty() {
            return Err("empty".into());
        }
        if words.len() > self.max_words {
            return Err(format!("{} words exceeds {}", words.len(), self.max_words));
        }
        if let Some(short) = words
            .iter()
            .find(|w| w.chars().filter(|c| c.is_alphanumeric()).count() < self.min_word_length)
        {
            return Err(format!("word `{short}` is too short"));
        }
        if self.forbidden_start_words.contains(words[0]) {
            return Err(format!("starts with `{}`", words[0]));
        }
        if text.chars().any(|c| c.is_ascii_digit()) {
            return Err("contains digits".into());
        }
        if BRACKET_RE.is_match(text) {
            return Err("contains brackets".into());
        }
        if URL_RE.is_match(text) {
            return Err("contains a URL".into());
        }
        if let Some(q) = words.iter().find(|w| self.question_words.contains(**w)) {
            return Err(format!("contains question word `{q}`"));
        }

        if let Some(token) = analysis.tokens.iter().find(|t| {
            matches!(
                t.dep,
                DepRole::Prep | DepRole::Punct | DepRole::Det | DepRole::Aux | DepRole::Mark
            )
        }) {
            if !is_proper_noun_chain(analysis) {
                return Err(format!(
                    "`{}` has function-word role {}",
                    token.text,
                    token.dep.as_str()
                ));
            }
        }
        Ok(())
    }
}

/// Proper nouns joined only by prepositions ("Bank of America").
fn is_proper_noun_chain(analysis: &Analysis) -> bool {
    let tags = analysis.pos_sequence();
    let propns = tags.iter().filter(|t| **t == PosTag::Propn).count();
    propns >= 2
        && tags.first() == Some(&PosTag::Propn)
        && tags.last() == Some(&PosTag::Propn)
        && tags.iter().all(|t| matches!(t, PosTag::Propn | PosTag::Adp))
        && analysis
            .tokens
            .iter()
            .all(|t| t.pos != PosTag::Punct)
}
