//! Keyword extraction and validation for page analysis.
//!
//! Three independent extractors (co-occurrence, term importance, named
//! entities) produce candidates; [`KeywordExtractionEngine`] merges them
//! across lexical variants via [`VariantManager`], filters them through the
//! [`KeywordValidator`] rule chain, ranks, caps, and links the survivors.

pub mod analysis;
pub mod engine;
pub mod extractors;
pub mod normalizer;
pub mod relationships;
pub mod validator;

pub use analysis::{
    Analysis, DepRole, EntityLabel, EntitySpan, HeuristicAnalyzer, LinguisticAnalyzer, PosTag,
    Span, Token,
};
pub use engine::{KeywordExtractionEngine, KeywordType, ProcessedKeyword};
pub use extractors::{Extractor, ExtractorKind, RawKeyword};
pub use normalizer::{Normalizer, VariantManager};
pub use validator::{KeywordValidator, Rejection, ValidationRule};
