//! Linguistic-analysis capability and a deterministic heuristic implementation.
//!
//! The validator and the entity extractor only depend on the shape of an
//! [`Analysis`]: tokens with part-of-speech tags and dependency roles,
//! noun-chunk spans, and labelled entity spans. [`HeuristicAnalyzer`] produces
//! that shape from lexicons, suffix rules, and capitalization; any other
//! [`LinguisticAnalyzer`] can be injected in its place.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use pagegraph_shared::Result;

use crate::normalizer::is_plural;

// ---------------------------------------------------------------------------
// Output shape
// ---------------------------------------------------------------------------

/// Coarse part-of-speech tag (Universal Dependencies tag set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PosTag {
    Noun,
    Propn,
    Adj,
    Verb,
    Aux,
    Adv,
    Adp,
    Det,
    Pron,
    Num,
    Cconj,
    Sconj,
    Part,
    Punct,
    Sym,
}

impl PosTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Noun => "NOUN",
            Self::Propn => "PROPN",
            Self::Adj => "ADJ",
            Self::Verb => "VERB",
            Self::Aux => "AUX",
            Self::Adv => "ADV",
            Self::Adp => "ADP",
            Self::Det => "DET",
            Self::Pron => "PRON",
            Self::Num => "NUM",
            Self::Cconj => "CCONJ",
            Self::Sconj => "SCONJ",
            Self::Part => "PART",
            Self::Punct => "PUNCT",
            Self::Sym => "SYM",
        }
    }

    /// Parse a tag name as written in config patterns (`"ADJ"`, `"NOUN"`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim().to_ascii_uppercase().as_str() {
            "NOUN" => Self::Noun,
            "PROPN" => Self::Propn,
            "ADJ" => Self::Adj,
            "VERB" => Self::Verb,
            "AUX" => Self::Aux,
            "ADV" => Self::Adv,
            "ADP" => Self::Adp,
            "DET" => Self::Det,
            "PRON" => Self::Pron,
            "NUM" => Self::Num,
            "CCONJ" => Self::Cconj,
            "SCONJ" => Self::Sconj,
            "PART" => Self::Part,
            "PUNCT" => Self::Punct,
            "SYM" => Self::Sym,
            _ => return None,
        })
    }

    pub fn is_nominal(self) -> bool {
        matches!(self, Self::Noun | Self::Propn)
    }
}

/// Syntactic role of a token within its sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepRole {
    Root,
    Nsubj,
    Dobj,
    Pobj,
    Compound,
    Amod,
    Nummod,
    Advmod,
    Det,
    Prep,
    Aux,
    Mark,
    Cc,
    Punct,
    Dep,
}

impl DepRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "ROOT",
            Self::Nsubj => "nsubj",
            Self::Dobj => "dobj",
            Self::Pobj => "pobj",
            Self::Compound => "compound",
            Self::Amod => "amod",
            Self::Nummod => "nummod",
            Self::Advmod => "advmod",
            Self::Det => "det",
            Self::Prep => "prep",
            Self::Aux => "aux",
            Self::Mark => "mark",
            Self::Cc => "cc",
            Self::Punct => "punct",
            Self::Dep => "dep",
        }
    }
}

/// Named-entity category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityLabel {
    Person,
    Org,
    Gpe,
    Misc,
    Date,
    Time,
    Cardinal,
    Ordinal,
    Quantity,
    Percent,
}

impl EntityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Org => "ORG",
            Self::Gpe => "GPE",
            Self::Misc => "MISC",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Cardinal => "CARDINAL",
            Self::Ordinal => "ORDINAL",
            Self::Quantity => "QUANTITY",
            Self::Percent => "PERCENT",
        }
    }

    /// Temporal and numeric categories that never make useful keywords.
    pub fn is_numeric_or_temporal(self) -> bool {
        matches!(
            self,
            Self::Date | Self::Time | Self::Cardinal | Self::Ordinal | Self::Quantity | Self::Percent
        )
    }
}

/// One token of analyzed text. Offsets are byte offsets into the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub pos: PosTag,
    pub dep: DepRole,
    /// `-ing` form used nominally ("learning" in "deep learning").
    pub gerund: bool,
}

/// A contiguous token range `[start_token, end_token)` with its surface text.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub start_token: usize,
    pub end_token: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// A labelled named-entity span.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySpan {
    pub span: Span,
    pub label: EntityLabel,
}

/// Full analysis of one piece of text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub tokens: Vec<Token>,
    pub noun_chunks: Vec<Span>,
    pub entities: Vec<EntitySpan>,
}

impl Analysis {
    /// Tags of all non-punctuation tokens.
    pub fn pos_sequence(&self) -> Vec<PosTag> {
        self.content_tokens().map(|t| t.pos).collect()
    }

    /// Tokens that are not punctuation.
    pub fn content_tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(|t| t.pos != PosTag::Punct)
    }

    fn content_range(&self) -> Option<(usize, usize)> {
        let first = self.tokens.iter().position(|t| t.pos != PosTag::Punct)?;
        let last = self.tokens.iter().rposition(|t| t.pos != PosTag::Punct)?;
        Some((first, last + 1))
    }

    /// The entity covering every content token, if any.
    pub fn entity_spanning_all(&self) -> Option<&EntitySpan> {
        let (first, end) = self.content_range()?;
        self.entities
            .iter()
            .find(|e| e.span.start_token <= first && e.span.end_token >= end)
    }

    /// Whether a noun chunk covers every content token.
    pub fn is_single_noun_chunk(&self) -> bool {
        let Some((first, end)) = self.content_range() else {
            return false;
        };
        self.noun_chunks
            .iter()
            .any(|c| c.start_token <= first && c.end_token >= end)
    }

    pub fn has_dep(&self, dep: DepRole) -> bool {
        self.tokens.iter().any(|t| t.dep == dep)
    }
}

/// Capability interface: turn text into an [`Analysis`].
pub trait LinguisticAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> Result<Analysis>;
}

// ---------------------------------------------------------------------------
// Lexicons
// ---------------------------------------------------------------------------

fn set(words: &'static [&'static str]) -> HashSet<&'static str> {
    words.iter().copied().collect()
}

static DETERMINERS: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    set(&[
        "a", "an", "another", "all", "any", "both", "each", "either", "every", "neither", "no",
        "some", "that", "the", "these", "this", "those",
    ])
});

static PRONOUNS: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    set(&[
        "anything", "everyone", "everything", "he", "her", "hers", "herself", "him", "himself",
        "his", "i", "it", "its", "itself", "me", "mine", "my", "myself", "nothing", "our",
        "ours", "ourselves", "she", "someone", "something", "their", "theirs", "them",
        "themselves", "they", "us", "we", "what", "which", "who", "whom", "whose", "you",
        "your", "yours",
    ])
});

static ADPOSITIONS: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    set(&[
        "about", "above", "across", "after", "against", "among", "around", "at", "before",
        "behind", "below", "beneath", "beside", "between", "beyond", "by", "despite", "down",
        "during", "except", "for", "from", "in", "inside", "into", "near", "of", "off", "on",
        "onto", "out", "outside", "over", "per", "since", "through", "throughout", "to",
        "toward", "towards", "under", "until", "up", "upon", "via", "with", "within", "without",
    ])
});

static COORDINATORS: LazyLock<HashSet<&str>> =
    LazyLock::new(|| set(&["and", "but", "nor", "or", "&", "yet"]));

static SUBORDINATORS: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    set(&[
        "although", "because", "if", "once", "than", "though", "unless", "whereas", "whether",
        "while",
    ])
});

static AUXILIARIES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    set(&[
        "am", "are", "be", "been", "being", "can", "could", "did", "do", "does", "had", "has",
        "have", "having", "is", "may", "might", "must", "shall", "should", "was", "were", "will",
        "would",
    ])
});

static ADVERBS: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    set(&[
        "again", "almost", "already", "also", "always", "often", "how", "however", "just",
        "more", "most", "much", "never", "not", "now", "only", "perhaps", "quite", "rather",
        "really", "so", "soon", "still", "then", "there", "thus", "too", "very", "well", "when",
        "where", "why",
    ])
});

static NUMBER_WORDS: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    set(&[
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
        "eleven", "twelve", "twenty", "hundred", "thousand", "million", "billion",
    ])
});

static ADJECTIVES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    set(&[
        "artificial", "bad", "best", "better", "big", "clean", "cold", "common", "complex",
        "current", "dark", "deep", "different", "early", "easy", "efficient", "fast", "few",
        "fifth", "first", "free", "fourth", "full", "general", "good", "great", "hard", "high",
        "hot", "huge", "important", "independent", "key", "large", "last", "late", "little",
        "long", "low", "main", "major", "many", "minor", "modern", "new", "next", "old", "open",
        "other", "own", "public", "quick", "raw", "real", "recent", "relevant", "rich", "same",
        "second", "short", "significant", "simple", "slow", "small", "smart", "soft",
        "specific", "strong", "third", "true", "whole", "wide", "young",
    ])
});

/// Nouns that happen to carry an adjective or adverb suffix.
static SUFFIX_EXCEPTIONS: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    set(&[
        "animal", "archive", "capital", "chemical", "clinic", "critic", "crystal", "executive",
        "family", "festival", "graphic", "hospital", "individual", "initiative", "interval",
        "journal", "logic", "manual", "material", "music", "objective", "portal", "potential",
        "principal", "professional", "proposal", "reply", "republic", "rival", "signal",
        "supply", "table", "terminal", "topic", "total", "traffic", "tutorial", "variable",
    ])
});

/// `-ing` words that are plain nouns, never verb forms.
static ING_NOUNS: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    set(&[
        "ceiling", "evening", "king", "morning", "ring", "spring", "string", "thing", "things",
        "wing",
    ])
});

const VERB_BASES: &[&str] = &[
    "allow", "apply", "become", "begin", "bring", "build", "change", "come", "crawl", "create",
    "describe", "develop", "enable", "explain", "find", "get", "give", "go", "grow", "help", "improve",
    "include", "keep", "know", "lead", "learn", "let", "make", "mean", "need", "offer",
    "provide", "reach", "read", "require", "reshape", "run", "say", "see", "seem", "show",
    "start", "support", "take", "think", "train", "transform", "use", "want", "work", "write",
];

const IRREGULAR_VERBS: &[&str] = &[
    "became", "began", "begun", "brought", "built", "came", "found", "gave", "given", "gone",
    "got", "grew", "grown", "knew", "known", "led", "made", "meant", "ran", "running", "said", "saw", "seen",
    "shown", "taken", "thought", "took", "went", "written", "wrote",
];

static VERB_FORMS: LazyLock<HashSet<String>> = LazyLock::new(|| {
    let mut forms: HashSet<String> = IRREGULAR_VERBS.iter().map(|v| v.to_string()).collect();
    for base in VERB_BASES {
        forms.extend(inflect(base));
    }
    forms
});

fn inflect(base: &str) -> [String; 4] {
    let consonant_y = base.ends_with('y')
        && !base
            .chars()
            .rev()
            .nth(1)
            .is_some_and(|c| "aeiou".contains(c));

    let third = if consonant_y {
        format!("{}ies", &base[..base.len() - 1])
    } else if ["s", "sh", "ch", "x", "z", "o"].iter().any(|s| base.ends_with(s)) {
        format!("{base}es")
    } else {
        format!("{base}s")
    };
    let past = if consonant_y {
        format!("{}ied", &base[..base.len() - 1])
    } else if base.ends_with('e') {
        format!("{base}d")
    } else {
        format!("{base}ed")
    };
    let ing = if base.ends_with('e') && !base.ends_with("ee") {
        format!("{}ing", &base[..base.len() - 1])
    } else {
        format!("{base}ing")
    };
    [base.to_string(), third, past, ing]
}

static GIVEN_NAMES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    set(&[
        "ada", "alan", "albert", "alice", "anna", "barbara", "bill", "bob", "charles", "david",
        "elizabeth", "emily", "george", "grace", "isaac", "james", "jane", "jeff", "jessica",
        "john", "joseph", "karen", "linda", "lisa", "marie", "mark", "mary", "michael", "nancy",
        "paul", "peter", "richard", "robert", "sarah", "steve", "susan", "thomas", "tim", "tom",
        "william",
    ])
});

static HONORIFICS: LazyLock<HashSet<&str>> =
    LazyLock::new(|| set(&["dr", "mr", "mrs", "ms", "prof", "sir"]));

static ORG_SUFFIXES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    set(&[
        "agency", "airlines", "association", "bank", "co", "college", "company", "consulting",
        "corp", "corporation", "council", "foundation", "group", "holdings", "inc",
        "incorporated", "industries", "institute", "lab", "laboratories", "labs", "llc", "ltd",
        "media", "partners", "plc", "press", "society", "software", "solutions",
        "technologies", "university", "ventures",
    ])
});

static ORG_PREFIXES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    set(&["bank", "college", "department", "institute", "ministry", "university"])
});

static PLACES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    set(&[
        "africa", "america", "asia", "australia", "beijing", "berlin", "boston", "brazil",
        "britain", "california", "canada", "chicago", "china", "england", "europe", "france",
        "germany", "india", "ireland", "italy", "japan", "korea", "london", "mexico",
        "netherlands", "norway", "paris", "russia", "scotland", "seattle", "singapore", "spain",
        "sweden", "texas", "tokyo", "washington", "york",
    ])
});

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\p{L}[\p{L}\p{N}]*(?:['’\-][\p{L}\p{N}]+)*|\p{N}+(?:[.,:]\p{N}+)*(?:%|st|nd|rd|th)?|\S")
        .expect("valid regex")
});

/// Numeric and temporal entity patterns, highest priority first.
static NUMERIC_ENTITY_PATTERNS: LazyLock<Vec<(EntityLabel, Regex)>> = LazyLock::new(|| {
    let months = "January|February|March|April|May|June|July|August|September|October|November|December";
    vec![
        (
            EntityLabel::Date,
            Regex::new(&format!(
                r"\b(?:{months})(?:\s+\d{{1,2}}(?:st|nd|rd|th)?)?(?:,?\s+\d{{4}})?\b"
            ))
            .expect("valid regex"),
        ),
        (
            EntityLabel::Date,
            Regex::new(r"\b(?:Monday|Tuesday|Wednesday|Thursday|Friday|Saturday|Sunday)s?\b")
                .expect("valid regex"),
        ),
        (
            EntityLabel::Date,
            Regex::new(r"(?i)\b(?:yesterday|today|tomorrow|tonight)\b").expect("valid regex"),
        ),
        (
            EntityLabel::Date,
            Regex::new(r"\b(?:1[5-9]|20)\d{2}s?\b").expect("valid regex"),
        ),
        (
            EntityLabel::Time,
            Regex::new(r"(?i)\b\d{1,2}(?::\d{2})?\s?(?:am|pm)\b|\b\d{1,2}:\d{2}\b")
                .expect("valid regex"),
        ),
        (
            EntityLabel::Percent,
            Regex::new(r"(?i)\b\d+(?:\.\d+)?\s?(?:%|percent\b)").expect("valid regex"),
        ),
        (
            EntityLabel::Quantity,
            Regex::new(
                r"(?i)\b\d+(?:\.\d+)?\s?(?:kg|mg|km|cm|mm|ml|gb|mb|kb|tb|oz|lbs?|miles?|pounds?|ounces?|liters?|litres?|meters?|metres?|feet|foot|inches|inch|tons?)\b",
            )
            .expect("valid regex"),
        ),
        (
            EntityLabel::Ordinal,
            Regex::new(
                r"(?i)\b(?:first|second|third|fourth|fifth|sixth|seventh|eighth|ninth|tenth|\d+(?:st|nd|rd|th))\b",
            )
            .expect("valid regex"),
        ),
        (
            EntityLabel::Cardinal,
            Regex::new(
                r"(?i)\b(?:\d+(?:[.,]\d+)*|zero|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|twenty|hundred|thousand|million|billion)\b",
            )
            .expect("valid regex"),
        ),
    ]
});

// ---------------------------------------------------------------------------
// HeuristicAnalyzer
// ---------------------------------------------------------------------------

/// Deterministic rule-based analyzer.
///
/// Tags with closed-class lexicons, a verb lexicon, suffix rules, and
/// capitalization; assigns shallow dependency roles; finds noun chunks; and
/// labels entities from proper-noun runs plus numeric/temporal patterns.
#[derive(Debug, Clone, Default)]
pub struct HeuristicAnalyzer;

struct RawToken<'a> {
    text: &'a str,
    start: usize,
    end: usize,
    sentence_start: bool,
}

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn tokenize<'a>(&self, text: &'a str) -> Vec<RawToken<'a>> {
        let mut out: Vec<RawToken<'a>> = Vec::new();
        let mut sentence_start = true;
        for m in TOKEN_RE.find_iter(text) {
            let tok = m.as_str();
            out.push(RawToken {
                text: tok,
                start: m.start(),
                end: m.end(),
                sentence_start,
            });
            sentence_start = matches!(tok, "." | "!" | "?");
        }
        out
    }

    fn tag(&self, raw: &[RawToken<'_>]) -> Vec<(PosTag, bool)> {
        let mut tags: Vec<(PosTag, bool)> = Vec::with_capacity(raw.len());

        for (i, tok) in raw.iter().enumerate() {
            let prev = tags.last().map(|(p, _)| *p);
            let prev_lower = i
                .checked_sub(1)
                .map(|j| raw[j].text.to_lowercase())
                .unwrap_or_default();
            let capitalized_at =
                |j: usize| raw.get(j).is_some_and(|n| !n.sentence_start && is_capitalized(n.text));
            let joiner_at = |j: usize| {
                raw.get(j)
                    .is_some_and(|n| matches!(n.text, "of" | "for" | "and" | "&"))
            };
            let next_capitalized =
                capitalized_at(i + 1) || (joiner_at(i + 1) && capitalized_at(i + 2));

            tags.push(self.tag_one(tok, prev, &prev_lower, next_capitalized));
        }
        tags
    }

    fn tag_one(
        &self,
        tok: &RawToken<'_>,
        prev: Option<PosTag>,
        prev_lower: &str,
        next_capitalized: bool,
    ) -> (PosTag, bool) {
        let text = tok.text;
        let first = text.chars().next().unwrap_or(' ');

        if !first.is_alphanumeric() {
            let pos = if "$%+=<>*/^#@|~".contains(first) {
                PosTag::Sym
            } else {
                PosTag::Punct
            };
            return (pos, false);
        }
        if first.is_numeric() {
            return (PosTag::Num, false);
        }

        let lower = text.to_lowercase();

        if is_capitalized(text) {
            // "US" and "IT" stay proper nouns; "I" and "The" keep their class
            if let Some(closed) = closed_class(&lower) {
                if !is_all_caps(text) {
                    return (closed, false);
                }
            }
            if !tok.sentence_start
                || is_all_caps(text)
                || GIVEN_NAMES.contains(lower.as_str())
                || HONORIFICS.contains(lower.as_str())
                || next_capitalized
            {
                return (PosTag::Propn, false);
            }
        }

        if let Some(closed) = closed_class(&lower) {
            return (closed, false);
        }
        if NUMBER_WORDS.contains(lower.as_str()) {
            return (PosTag::Num, false);
        }
        if ADJECTIVES.contains(lower.as_str()) {
            return (PosTag::Adj, false);
        }

        let after_aux = matches!(prev, Some(PosTag::Aux) | Some(PosTag::Part));
        let after_nominal = matches!(prev, Some(PosTag::Noun | PosTag::Propn | PosTag::Pron));
        // A plural subject takes the base form: "orchards grow".
        let after_plural =
            matches!(prev, Some(PosTag::Noun | PosTag::Propn)) && is_plural(prev_lower);

        if lower.ends_with("ing") && lower.len() > 4 && !ING_NOUNS.contains(lower.as_str()) {
            return if after_aux {
                (PosTag::Verb, false)
            } else {
                (PosTag::Noun, true)
            };
        }

        if VERB_FORMS.contains(&lower) {
            let is_past = lower.ends_with("ed") || IRREGULAR_VERBS.contains(&lower.as_str());
            let is_third = lower.ends_with('s');
            if after_aux
                || prev_lower == "to"
                || matches!(prev, Some(PosTag::Pron))
                || (is_past && after_nominal)
                || (is_third && after_nominal)
                || after_plural
            {
                return (PosTag::Verb, false);
            }
            if is_past {
                return (PosTag::Adj, false);
            }
            return (PosTag::Noun, false);
        }

        if lower.ends_with("ed") && lower.len() > 4 {
            return if after_nominal || after_aux {
                (PosTag::Verb, false)
            } else {
                (PosTag::Adj, false)
            };
        }

        if !SUFFIX_EXCEPTIONS.contains(lower.as_str()) {
            if lower.ends_with("ly") && lower.len() > 4 {
                return (PosTag::Adv, false);
            }
            const ADJ_SUFFIXES: &[&str] =
                &["al", "ive", "ous", "ful", "less", "able", "ible", "ic", "ish"];
            if lower.len() > 4 && ADJ_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
                return (PosTag::Adj, false);
            }
        }

        (PosTag::Noun, false)
    }

    fn assign_dependencies(&self, tokens: &mut [Token]) {
        let mut sentence_has_verb = false;
        let mut root_assigned = false;
        let mut after_adposition = false;

        for i in 0..tokens.len() {
            let pos = tokens[i].pos;
            let next_pos = tokens.get(i + 1).map(|t| t.pos);

            tokens[i].dep = match pos {
                PosTag::Det => DepRole::Det,
                PosTag::Adp => {
                    after_adposition = true;
                    DepRole::Prep
                }
                PosTag::Punct | PosTag::Sym => {
                    if matches!(tokens[i].text.as_str(), "." | "!" | "?") {
                        sentence_has_verb = false;
                        root_assigned = false;
                        after_adposition = false;
                    }
                    DepRole::Punct
                }
                PosTag::Aux => DepRole::Aux,
                PosTag::Sconj => DepRole::Mark,
                PosTag::Cconj => DepRole::Cc,
                PosTag::Adj => DepRole::Amod,
                PosTag::Num => DepRole::Nummod,
                PosTag::Adv | PosTag::Part => DepRole::Advmod,
                PosTag::Verb => {
                    sentence_has_verb = true;
                    after_adposition = false;
                    if root_assigned {
                        DepRole::Dep
                    } else {
                        root_assigned = true;
                        DepRole::Root
                    }
                }
                PosTag::Pron => {
                    if sentence_has_verb {
                        DepRole::Dobj
                    } else {
                        DepRole::Nsubj
                    }
                }
                PosTag::Noun | PosTag::Propn => {
                    if next_pos.is_some_and(|p| p.is_nominal()) {
                        DepRole::Compound
                    } else if after_adposition {
                        after_adposition = false;
                        DepRole::Pobj
                    } else if sentence_has_verb {
                        DepRole::Dobj
                    } else {
                        DepRole::Nsubj
                    }
                }
            };
        }

        // Verbless fragments ("machine learning research") are rooted at their last head noun.
        let mut sentence_begin = 0;
        for i in 0..=tokens.len() {
            let boundary = i == tokens.len()
                || matches!(tokens[i].text.as_str(), "." | "!" | "?");
            if !boundary {
                continue;
            }
            let sentence = &mut tokens[sentence_begin..i];
            if !sentence.iter().any(|t| t.dep == DepRole::Root) {
                if let Some(head) = sentence
                    .iter_mut()
                    .rev()
                    .find(|t| t.pos.is_nominal() && t.dep != DepRole::Compound)
                {
                    head.dep = DepRole::Root;
                }
            }
            sentence_begin = i + 1;
        }
    }

    fn noun_chunks(&self, text: &str, tokens: &[Token]) -> Vec<Span> {
        let mut chunks = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            if !matches!(
                tokens[i].pos,
                PosTag::Adj | PosTag::Num | PosTag::Noun | PosTag::Propn
            ) {
                i += 1;
                continue;
            }
            let start = i;
            while i < tokens.len()
                && matches!(
                    tokens[i].pos,
                    PosTag::Adj | PosTag::Num | PosTag::Noun | PosTag::Propn
                )
            {
                i += 1;
            }
            // Trim trailing modifiers so the chunk ends on its head noun
            let mut end = i;
            while end > start && !tokens[end - 1].pos.is_nominal() {
                end -= 1;
            }
            if end > start {
                chunks.push(make_span(text, tokens, start, end));
            }
        }
        chunks
    }

    fn entities(&self, text: &str, tokens: &[Token]) -> Vec<EntitySpan> {
        let mut entities: Vec<EntitySpan> = Vec::new();
        let mut claimed = vec![false; tokens.len()];

        for (label, re) in NUMERIC_ENTITY_PATTERNS.iter() {
            for m in re.find_iter(text) {
                let covered: Vec<usize> = (0..tokens.len())
                    .filter(|&t| tokens[t].start >= m.start() && tokens[t].end <= m.end())
                    .collect();
                let (Some(&first), Some(&last)) = (covered.first(), covered.last()) else {
                    continue;
                };
                if covered.iter().any(|&t| claimed[t]) {
                    continue;
                }
                for &t in &covered {
                    claimed[t] = true;
                }
                entities.push(EntitySpan {
                    span: make_span(text, tokens, first, last + 1),
                    label: *label,
                });
            }
        }

        let mut i = 0;
        while i < tokens.len() {
            if tokens[i].pos != PosTag::Propn || claimed[i] {
                i += 1;
                continue;
            }
            let start = i;
            let mut end = i + 1;
            loop {
                if end < tokens.len() && tokens[end].pos == PosTag::Propn && !claimed[end] {
                    end += 1;
                    continue;
                }
                // "Bank of America", "Johnson & Johnson"
                let joiner = end + 1 < tokens.len()
                    && matches!(
                        tokens[end].text.to_lowercase().as_str(),
                        "of" | "for" | "and" | "&"
                    )
                    && tokens[end + 1].pos == PosTag::Propn
                    && !claimed[end + 1];
                if joiner {
                    end += 2;
                    continue;
                }
                break;
            }

            let label = label_proper_noun_run(&tokens[start..end]);
            entities.push(EntitySpan {
                span: make_span(text, tokens, start, end),
                label,
            });
            i = end;
        }

        entities.sort_by_key(|e| e.span.start_token);
        entities
    }
}

impl LinguisticAnalyzer for HeuristicAnalyzer {
    fn analyze(&self, text: &str) -> Result<Analysis> {
        let raw = self.tokenize(text);
        let tags = self.tag(&raw);

        let mut tokens: Vec<Token> = raw
            .iter()
            .zip(tags)
            .map(|(r, (pos, gerund))| Token {
                text: r.text.to_string(),
                start: r.start,
                end: r.end,
                pos,
                dep: DepRole::Dep,
                gerund,
            })
            .collect();

        self.assign_dependencies(&mut tokens);
        let noun_chunks = self.noun_chunks(text, &tokens);
        let entities = self.entities(text, &tokens);

        Ok(Analysis {
            tokens,
            noun_chunks,
            entities,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn closed_class(lower: &str) -> Option<PosTag> {
    if DETERMINERS.contains(lower) {
        Some(PosTag::Det)
    } else if AUXILIARIES.contains(lower) {
        Some(PosTag::Aux)
    } else if PRONOUNS.contains(lower) {
        Some(PosTag::Pron)
    } else if ADPOSITIONS.contains(lower) {
        Some(PosTag::Adp)
    } else if COORDINATORS.contains(lower) {
        Some(PosTag::Cconj)
    } else if SUBORDINATORS.contains(lower) {
        Some(PosTag::Sconj)
    } else if lower == "not" || lower == "n't" {
        Some(PosTag::Part)
    } else if ADVERBS.contains(lower) {
        Some(PosTag::Adv)
    } else {
        None
    }
}

fn is_capitalized(text: &str) -> bool {
    text.chars().next().is_some_and(|c| c.is_uppercase())
}

fn is_all_caps(text: &str) -> bool {
    text.chars().count() >= 2
        && text.chars().any(|c| c.is_alphabetic())
        && text.chars().all(|c| !c.is_alphabetic() || c.is_uppercase())
}

fn make_span(text: &str, tokens: &[Token], start_token: usize, end_token: usize) -> Span {
    let start = tokens[start_token].start;
    let end = tokens[end_token - 1].end;
    Span {
        start_token,
        end_token,
        start,
        end,
        text: text[start..end].to_string(),
    }
}

fn label_proper_noun_run(run: &[Token]) -> EntityLabel {
    let lowered: Vec<String> = run
        .iter()
        .map(|t| t.text.trim_end_matches('.').to_lowercase())
        .collect();
    let first = lowered.first().map(String::as_str).unwrap_or("");
    let last = lowered.last().map(String::as_str).unwrap_or("");

    if ORG_SUFFIXES.contains(last) || (run.len() > 1 && ORG_PREFIXES.contains(first)) {
        EntityLabel::Org
    } else if GIVEN_NAMES.contains(first) || HONORIFICS.contains(first) {
        EntityLabel::Person
    } else if lowered.iter().any(|w| PLACES.contains(w.as_str())) {
        EntityLabel::Gpe
    } else if run.len() == 1 && is_all_caps(&run[0].text) {
        EntityLabel::Org
    } else {
        EntityLabel::Misc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(text: &str) -> Analysis {
        HeuristicAnalyzer::new().analyze(text).expect("analyze")
    }

    fn tags(text: &str) -> Vec<&'static str> {
        analyze(text).pos_sequence().iter().map(|p| p.as_str()).collect()
    }

    #[test]
    fn tags_noun_phrases() {
        assert_eq!(tags("neural networks"), vec!["ADJ", "NOUN"]);
        assert_eq!(tags("deep learning"), vec!["ADJ", "NOUN"]);
        assert_eq!(tags("machine learning"), vec!["NOUN", "NOUN"]);
    }

    #[test]
    fn tags_sentence_with_auxiliary() {
        let a = analyze("Neural networks are reshaping research.");
        let seq: Vec<&str> = a.tokens.iter().map(|t| t.pos.as_str()).collect();
        assert_eq!(seq, vec!["ADJ", "NOUN", "AUX", "VERB", "NOUN", "PUNCT"]);
        assert!(a.tokens[1].dep == DepRole::Nsubj);
        assert!(a.tokens[3].dep == DepRole::Root);
    }

    #[test]
    fn gerund_after_modifier_is_nominal() {
        let a = analyze("deep learning");
        assert!(a.tokens[1].gerund);
        assert_eq!(a.tokens[1].pos, PosTag::Noun);
    }

    #[test]
    fn recognises_person_and_org() {
        let a = analyze("John Smith works at Acme Corp");
        let found: Vec<(&str, &str)> = a
            .entities
            .iter()
            .map(|e| (e.span.text.as_str(), e.label.as_str()))
            .collect();
        assert_eq!(found, vec![("John Smith", "PERSON"), ("Acme Corp", "ORG")]);
        assert_eq!(a.tokens[2].pos, PosTag::Verb);
        assert_eq!(a.tokens[3].dep, DepRole::Prep);
    }

    #[test]
    fn joins_proper_nouns_across_of() {
        let a = analyze("She banks with Bank of America.");
        let entity = a.entities.iter().find(|e| e.label == EntityLabel::Org).unwrap();
        assert_eq!(entity.span.text, "Bank of America");
    }

    #[test]
    fn numeric_and_temporal_entities() {
        let a = analyze("Sales rose 5% on Monday, March 3, 2024 after three quarters.");
        let labels: Vec<EntityLabel> = a.entities.iter().map(|e| e.label).collect();
        assert!(labels.contains(&EntityLabel::Percent));
        assert!(labels.contains(&EntityLabel::Date));
        assert!(labels.contains(&EntityLabel::Cardinal));
    }

    #[test]
    fn noun_chunks_end_on_head() {
        let a = analyze("The quick search engine finds pages.");
        let chunks: Vec<&str> = a.noun_chunks.iter().map(|c| c.text.as_str()).collect();
        assert!(chunks.contains(&"quick search engine"));
    }

    #[test]
    fn compound_dependency_marked() {
        let a = analyze("search engine");
        assert_eq!(a.tokens[0].dep, DepRole::Compound);
        assert!(a.is_single_noun_chunk());
    }

    #[test]
    fn verbless_fragment_gets_root() {
        let a = analyze("machine learning research");
        assert_eq!(a.tokens[2].dep, DepRole::Root);
    }

    #[test]
    fn base_verb_after_plural_noun_is_verb() {
        assert_eq!(tags("orchards grow"), vec!["NOUN", "VERB"]);
        assert_eq!(tags("researchers build"), vec!["NOUN", "VERB"]);
        assert_eq!(tags("Zebra crossings help."), vec!["NOUN", "NOUN", "VERB", "PUNCT"]);
        // Singular nouns keep the compound reading.
        assert_eq!(tags("search help"), vec!["NOUN", "NOUN"]);
    }

    #[test]
    fn inflects_verbs() {
        assert_eq!(
            inflect("apply"),
            ["apply".to_string(), "applies".into(), "applied".into(), "applying".into()]
        );
        assert_eq!(inflect("make")[3], "making");
        assert_eq!(inflect("reach")[1], "reaches");
    }

    #[test]
    fn pos_tag_parse_roundtrip() {
        for tag in [PosTag::Noun, PosTag::Propn, PosTag::Adj, PosTag::Adp] {
            assert_eq!(PosTag::parse(tag.as_str()), Some(tag));
        }
        assert_eq!(PosTag::parse("noun"), Some(PosTag::Noun));
        assert_eq!(PosTag::parse("BOGUS"), None);
    }
}
