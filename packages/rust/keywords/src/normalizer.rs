//! Canonical keys for keyword text and the variant registry built on them.
//!
//! Two surface forms are variants of one canonical keyword exactly when
//! [`Normalizer::normalize`] maps them to the same key.

use std::collections::{BTreeMap, BTreeSet};

/// Words ending in `s` that are already singular.
const SINGULAR_S_WORDS: &[&str] = &[
    "analysis", "basis", "bias", "bus", "canvas", "chaos", "corpus", "crisis", "diagnosis",
    "gas", "lens", "mathematics", "news", "physics", "series", "species", "statistics", "status",
    "thesis", "kubernetes",
];

/// Stateless text normalizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    /// Lowercase, fold `-`/`_` to spaces, trim edge punctuation, collapse
    /// whitespace and singularise the final word.
    pub fn normalize(text: &str) -> String {
        let lowered = text.to_lowercase().replace(['-', '_'], " ");
        let mut words: Vec<&str> = lowered
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| !w.is_empty())
            .collect();

        let Some(last) = words.pop() else {
            return String::new();
        };
        let mut key = words.join(" ");
        if !key.is_empty() {
            key.push(' ');
        }
        key.push_str(&singularize(last));
        key
    }
}

/// Whether `word` is a plural form the normalizer would singularise.
pub(crate) fn is_plural(word: &str) -> bool {
    singularize(word) != word
}

fn singularize(word: &str) -> String {
    if word.len() <= 3 || !word.ends_with('s') || SINGULAR_S_WORDS.contains(&word) {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["sses", "ches", "shes", "xes", "zzes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if ["ss", "us", "is", "ous"].iter().any(|s| word.ends_with(s)) {
        return word.to_string();
    }
    word[..word.len() - 1].to_string()
}

// ---------------------------------------------------------------------------
// VariantManager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct VariantEntry {
    /// Surface form -> accumulated frequency.
    surfaces: BTreeMap<String, usize>,
    /// First surface contributed by the entity extractor, if any.
    entity_surface: Option<String>,
}

/// Registry of canonical keys and the surface forms that map onto them.
///
/// Ordered maps keep every lookup and iteration deterministic.
#[derive(Debug, Clone, Default)]
pub struct VariantManager {
    entries: BTreeMap<String, VariantEntry>,
}

impl VariantManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a surface form and return its canonical key.
    ///
    /// Empty keys (text made only of punctuation) are not registered.
    pub fn register(&mut self, surface: &str, frequency: usize, from_entity: bool) -> String {
        let key = Normalizer::normalize(surface);
        if key.is_empty() {
            return key;
        }
        let surface = surface.split_whitespace().collect::<Vec<_>>().join(" ");
        let entry = self.entries.entry(key.clone()).or_default();
        *entry.surfaces.entry(surface.clone()).or_default() += frequency.max(1);
        if from_entity && entry.entity_surface.is_none() {
            entry.entity_surface = Some(surface);
        }
        key
    }

    /// Preferred display form for a key: the entity surface when one was
    /// registered, otherwise the most frequent surface (ties lexical).
    pub fn canonical_form(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if let Some(surface) = &entry.entity_surface {
            return Some(surface.clone());
        }
        entry
            .surfaces
            .iter()
            .max_by(|(a, fa), (b, fb)| fa.cmp(fb).then_with(|| b.cmp(a)))
            .map(|(s, _)| s.clone())
    }

    /// Every surface form registered under `key`.
    pub fn variants(&self, key: &str) -> BTreeSet<String> {
        self.entries
            .get(key)
            .map(|e| e.surfaces.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_case_space_and_plurals() {
        assert_eq!(Normalizer::normalize("  Neural   Networks "), "neural network");
        assert_eq!(Normalizer::normalize("state-of-the-art"), "state of the art");
        assert_eq!(Normalizer::normalize("\"Deep Learning\","), "deep learning");
        assert_eq!(Normalizer::normalize("libraries"), "library");
        assert_eq!(Normalizer::normalize("search boxes"), "search box");
    }

    #[test]
    fn normalize_keeps_singular_s_words() {
        assert_eq!(Normalizer::normalize("analysis"), "analysis");
        assert_eq!(Normalizer::normalize("business"), "business");
        assert_eq!(Normalizer::normalize("Physics"), "physics");
        assert_eq!(Normalizer::normalize("corpus"), "corpus");
        assert_eq!(Normalizer::normalize("gas"), "gas");
    }

    #[test]
    fn only_last_word_is_singularised() {
        assert_eq!(Normalizer::normalize("sales reports"), "sales report");
    }

    #[test]
    fn normalize_is_idempotent() {
        for text in ["Neural Networks", "Acme Corp.", "data-sets", "APIs"] {
            let once = Normalizer::normalize(text);
            assert_eq!(Normalizer::normalize(&once), once);
        }
    }

    #[test]
    fn variants_share_one_key() {
        let mut vm = VariantManager::new();
        let a = vm.register("neural networks", 2, false);
        let b = vm.register("Neural network", 1, false);
        assert_eq!(a, b);
        assert_eq!(vm.len(), 1);
        assert_eq!(
            vm.variants(&a).into_iter().collect::<Vec<_>>(),
            vec!["Neural network".to_string(), "neural networks".to_string()]
        );
        assert_eq!(vm.canonical_form(&a).as_deref(), Some("neural networks"));
    }

    #[test]
    fn entity_surface_wins_display_form() {
        let mut vm = VariantManager::new();
        let key = vm.register("acme corp", 3, false);
        vm.register("Acme Corp", 1, true);
        assert_eq!(vm.canonical_form(&key).as_deref(), Some("Acme Corp"));
    }

    #[test]
    fn frequency_ties_break_lexically() {
        let mut vm = VariantManager::new();
        let key = vm.register("web page", 1, false);
        vm.register("web pages", 1, false);
        assert_eq!(vm.canonical_form(&key).as_deref(), Some("web page"));
    }

    #[test]
    fn punctuation_only_text_is_ignored() {
        let mut vm = VariantManager::new();
        assert_eq!(vm.register("--", 1, false), "");
        assert!(vm.is_empty());
    }
}
