//! Edges between accepted keywords.
//!
//! Structural edges (hierarchical, contains, synonym) come from the keyword
//! texts alone. Keywords that share a sentence but have no structural edge
//! are linked as `entity` (exactly one side is an entity) or `related`.

use std::collections::{BTreeMap, BTreeSet};

use pagegraph_shared::{KeywordRelationship, RelationshipKind};

use crate::engine::{KeywordType, ProcessedKeyword};

const HIERARCHICAL_CONFIDENCE: f64 = 0.8;
const SYNONYM_CONFIDENCE: f64 = 0.9;
const ENTITY_CONFIDENCE: f64 = 0.6;

/// Byte ranges of the sentences in `text`.
fn sentence_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') && chars.peek().is_none_or(|(_, n)| n.is_whitespace()) {
            ranges.push((start, i + 1));
            start = i + 1;
        }
    }
    if start < text.len() {
        ranges.push((start, text.len()));
    }
    ranges
}

fn sentences_of(positions: &[usize], ranges: &[(usize, usize)]) -> BTreeSet<usize> {
    positions
        .iter()
        .filter_map(|p| ranges.iter().position(|(s, e)| p >= s && p < e))
        .collect()
}

fn words(s: &str) -> Vec<&str> {
    s.split(' ').collect()
}

fn is_acronym_of(short: &str, long: &str) -> bool {
    let long_words = words(long);
    long_words.len() >= 2
        && !short.contains(' ')
        && short.chars().count() == long_words.len()
        && short
            .chars()
            .zip(&long_words)
            .all(|(c, w)| w.starts_with(c))
}

/// The structural relationship from `a` to `b`, if any.
fn structural(a: &ProcessedKeyword, b: &ProcessedKeyword) -> Option<KeywordRelationship> {
    let (na, nb) = (a.normalized.as_str(), b.normalized.as_str());
    let (wa, wb) = (words(na), words(nb));

    if wb.len() > wa.len() && nb.ends_with(&format!(" {na}")) {
        return Some(edge(a, b, RelationshipKind::Hierarchical, HIERARCHICAL_CONFIDENCE));
    }
    if wa.len() > wb.len()
        && !na.ends_with(&format!(" {nb}"))
        && wa.windows(wb.len()).any(|w| w == wb.as_slice())
    {
        let confidence = wb.len() as f64 / wa.len() as f64;
        return Some(edge(a, b, RelationshipKind::Contains, confidence));
    }
    if is_acronym_of(na, nb) {
        return Some(edge(a, b, RelationshipKind::Synonym, SYNONYM_CONFIDENCE));
    }
    None
}

fn edge(
    source: &ProcessedKeyword,
    target: &ProcessedKeyword,
    kind: RelationshipKind,
    confidence: f64,
) -> KeywordRelationship {
    KeywordRelationship {
        source: source.text.clone(),
        target: target.text.clone(),
        kind,
        confidence: confidence.clamp(0.0, 1.0),
        metadata: BTreeMap::new(),
    }
}

/// Derive relationships among `keywords`, whose positions index into `text`.
pub fn infer(keywords: &[ProcessedKeyword], text: &str) -> Vec<KeywordRelationship> {
    let ranges = sentence_ranges(text);
    let sentences: Vec<BTreeSet<usize>> = keywords
        .iter()
        .map(|k| sentences_of(&k.positions, &ranges))
        .collect();

    let mut out = Vec::new();
    for i in 0..keywords.len() {
        for j in (i + 1)..keywords.len() {
            let (a, b) = (&keywords[i], &keywords[j]);
            if a.normalized == b.normalized {
                continue;
            }

            let forward = structural(a, b);
            let backward = structural(b, a);
            if forward.is_some() || backward.is_some() {
                out.extend(forward);
                out.extend(backward);
                continue;
            }

            let shared = sentences[i].intersection(&sentences[j]).count();
            if shared == 0 {
                continue;
            }
            let a_entity = a.keyword_type == KeywordType::Entity;
            let b_entity = b.keyword_type == KeywordType::Entity;
            let mut rel = match (a_entity, b_entity) {
                (true, false) => edge(a, b, RelationshipKind::Entity, ENTITY_CONFIDENCE),
                (false, true) => edge(b, a, RelationshipKind::Entity, ENTITY_CONFIDENCE),
                _ => {
                    let (s, t) = if a.normalized <= b.normalized { (a, b) } else { (b, a) };
                    edge(s, t, RelationshipKind::Related, 0.3 + 0.1 * shared as f64)
                }
            };
            rel.metadata
                .insert("shared_sentences".into(), serde_json::Value::from(shared));
            out.push(rel);
        }
    }

    out.sort_by(|x, y| {
        (x.source.as_str(), x.target.as_str(), x.kind.as_str())
            .cmp(&(y.source.as_str(), y.target.as_str(), y.kind.as_str()))
    });
    out
}
