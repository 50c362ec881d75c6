//! Application configuration for the page-processing pipeline.
//!
//! User config lives at `~/.pagegraph/pagegraph.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::types::Stage;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pagegraph.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pagegraph";

/// Default database file name inside the config directory.
const DB_FILE_NAME: &str = "pagegraph.db";

// ---------------------------------------------------------------------------
// Config structs (matching pagegraph.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Orchestrator settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Keyword extraction settings.
    #[serde(default)]
    pub keywords: KeywordConfig,

    /// Keyword validation rule settings.
    #[serde(default)]
    pub validator: ValidatorConfig,

    /// Metadata extraction settings.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// HTTP capture settings.
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Graph store settings.
    #[serde(default)]
    pub storage: StorageSettings,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Maximum number of pages processed concurrently.
    #[serde(default = "default_max_concurrent_pages")]
    pub max_concurrent_pages: usize,

    /// Mirror every processing event into the log.
    #[serde(default = "default_true")]
    pub event_logging_enabled: bool,

    /// Most recent events kept in the in-memory event log.
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,

    /// Per-stage settings.
    #[serde(default)]
    pub stages: StagesConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_pages: default_max_concurrent_pages(),
            event_logging_enabled: true,
            event_log_capacity: default_event_log_capacity(),
            stages: StagesConfig::default(),
        }
    }
}

fn default_max_concurrent_pages() -> usize {
    4
}
fn default_event_log_capacity() -> usize {
    10_000
}
fn default_true() -> bool {
    true
}

/// Settings for a single stage (`[pipeline.stages.<name>]`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageSettings {
    /// Timeout applied to each component invocation in this stage.
    pub timeout_seconds: f64,
    /// A failure in a required stage sends the page to the error stage.
    pub required: bool,
    /// Whether entry validation runs before the stage's components.
    pub validation_required: bool,
}

impl StageSettings {
    pub const fn new(timeout_seconds: f64, required: bool) -> Self {
        Self {
            timeout_seconds,
            required,
            validation_required: true,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds.max(0.0))
    }
}

/// `[pipeline.stages]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesConfig {
    #[serde(default = "default_initialize")]
    pub initialize: StageSettings,
    #[serde(default = "default_metadata_stage")]
    pub metadata: StageSettings,
    #[serde(default = "default_content_stage")]
    pub content: StageSettings,
    #[serde(default = "default_analysis_stage")]
    pub analysis: StageSettings,
    #[serde(default = "default_storage_stage")]
    pub storage: StageSettings,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            initialize: default_initialize(),
            metadata: default_metadata_stage(),
            content: default_content_stage(),
            analysis: default_analysis_stage(),
            storage: default_storage_stage(),
        }
    }
}

impl StagesConfig {
    /// Settings for a stage that runs components. Terminal stages have none.
    pub fn get(&self, stage: Stage) -> Option<&StageSettings> {
        match stage {
            Stage::Initialize => Some(&self.initialize),
            Stage::Metadata => Some(&self.metadata),
            Stage::Content => Some(&self.content),
            Stage::Analysis => Some(&self.analysis),
            Stage::Storage => Some(&self.storage),
            Stage::Complete | Stage::Error => None,
        }
    }

    pub fn get_mut(&mut self, stage: Stage) -> Option<&mut StageSettings> {
        match stage {
            Stage::Initialize => Some(&mut self.initialize),
            Stage::Metadata => Some(&mut self.metadata),
            Stage::Content => Some(&mut self.content),
            Stage::Analysis => Some(&mut self.analysis),
            Stage::Storage => Some(&mut self.storage),
            Stage::Complete | Stage::Error => None,
        }
    }
}

fn default_initialize() -> StageSettings {
    StageSettings::new(5.0, true)
}
fn default_metadata_stage() -> StageSettings {
    StageSettings::new(10.0, true)
}
fn default_content_stage() -> StageSettings {
    StageSettings::new(10.0, true)
}
fn default_analysis_stage() -> StageSettings {
    StageSettings::new(30.0, false)
}
fn default_storage_stage() -> StageSettings {
    StageSettings::new(10.0, true)
}

/// `[keywords]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    /// Inputs shorter than this many characters yield no keywords.
    pub min_text_chars: usize,
    /// Cap on accepted canonical keywords.
    pub max_keywords: usize,
    /// Longest phrase (in words) any extractor may emit.
    pub max_words: usize,
    /// Minimum occurrences for an extractor to keep a candidate.
    pub min_frequency: usize,
    /// Minimum extractor-local score for a candidate.
    pub min_score: f64,
    /// Multiplier applied to term-importance scores before clamping to 1.0.
    pub term_score_scale: f64,
    /// Entity score for a single mention.
    pub entity_base_score: f64,
    /// Entity score added per additional mention.
    pub entity_frequency_step: f64,
    /// Run the three extractors on separate threads.
    pub parallel_extraction: bool,
    /// Phrase-boundary words for the co-occurrence and term extractors.
    pub stop_words: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 20,
            max_keywords: 20,
            max_words: 3,
            min_frequency: 1,
            min_score: 0.0,
            term_score_scale: 100.0,
            entity_base_score: 0.6,
            entity_frequency_step: 0.2,
            parallel_extraction: true,
            stop_words: default_stop_words(),
        }
    }
}

/// `[validator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Longest accepted keyword (in words).
    pub max_words: usize,
    /// Shortest accepted word (in characters).
    pub min_word_length: usize,
    /// Words a keyword may not start with.
    pub forbidden_start_words: Vec<String>,
    /// Words too vague to stand alone as keywords.
    pub generic_terms: Vec<String>,
    /// Abbreviations exempt from the code-pattern rule.
    pub abbreviations: Vec<String>,
    /// Programming-language keyword tokens.
    pub code_keywords: Vec<String>,
    /// Question words that disqualify a keyword.
    pub question_words: Vec<String>,
    /// Accepted part-of-speech shapes for the grammatical rule, space separated.
    pub noun_phrase_patterns: Vec<String>,
    /// Part-of-speech shapes the semantic rule treats as meaningful compounds.
    pub compound_patterns: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_words: 4,
            min_word_length: 2,
            forbidden_start_words: words(FORBIDDEN_START_WORDS),
            generic_terms: words(GENERIC_TERMS),
            abbreviations: words(ABBREVIATIONS),
            code_keywords: words(CODE_KEYWORDS),
            question_words: words(QUESTION_WORDS),
            noun_phrase_patterns: words(NOUN_PHRASE_PATTERNS),
            compound_patterns: words(COMPOUND_PATTERNS),
        }
    }
}

/// `[metadata]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Fields whose absence costs 0.2 quality each.
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<String>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            required_fields: default_required_fields(),
        }
    }
}

fn default_required_fields() -> Vec<String> {
    vec!["title".into()]
}

/// `[capture]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// User-Agent header sent when fetching pages.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Request timeout in seconds.
    #[serde(default = "default_capture_timeout")]
    pub timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_capture_timeout(),
        }
    }
}

fn default_user_agent() -> String {
    concat!("pagegraph/", env!("CARGO_PKG_VERSION")).into()
}
fn default_capture_timeout() -> u64 {
    30
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Database path; defaults to `~/.pagegraph/pagegraph.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

impl StorageSettings {
    /// Resolve the database path, falling back to the config directory.
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Ok(config_dir()?.join(DB_FILE_NAME)),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, frozen at construction)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, built once and shared read-only.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_concurrent_pages: usize,
    pub event_logging_enabled: bool,
    pub event_log_capacity: usize,
    pub stages: StagesConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_concurrent_pages: config.pipeline.max_concurrent_pages.max(1),
            event_logging_enabled: config.pipeline.event_logging_enabled,
            event_log_capacity: config.pipeline.event_log_capacity,
            stages: config.pipeline.stages.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in word lists
// ---------------------------------------------------------------------------

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| (*w).to_string()).collect()
}

/// Function words the NLTK English list leaves out.
const EXTRA_STOP_WORDS: &[&str] = &[
    "also", "could", "either", "etc", "even", "ever", "every", "however", "may", "might",
    "much", "must", "neither", "shall", "thus", "upon", "us", "whether", "whose", "within",
    "without", "would", "yet",
];

/// NLTK English stop words plus [`EXTRA_STOP_WORDS`], sorted and deduplicated.
fn default_stop_words() -> Vec<String> {
    let mut list: Vec<String> = stop_words::get(stop_words::LANGUAGE::English)
        .iter()
        .chain(EXTRA_STOP_WORDS)
        .map(|w| w.to_string())
        .collect();
    list.sort();
    list.dedup();
    list
}

const FORBIDDEN_START_WORDS: &[&str] = &[
    "a", "an", "and", "any", "but", "each", "every", "few", "for", "from", "her", "his",
    "in", "its", "many", "more", "most", "much", "my", "of", "on", "or", "other", "our",
    "several", "some", "such", "that", "the", "their", "these", "this", "those", "to",
    "very", "with", "your",
];

const GENERIC_TERMS: &[&str] = &[
    "analysis", "approach", "area", "article", "aspect", "case", "content", "data", "day",
    "element", "example", "factor", "form", "group", "information", "issue", "item", "kind",
    "level", "method", "number", "page", "part", "people", "problem", "process", "research",
    "result", "section", "set", "stuff", "system", "thing", "time", "type", "use", "value",
    "way", "work", "year",
];

const ABBREVIATIONS: &[&str] = &[
    "ai", "api", "cpu", "css", "faq", "gpu", "html", "http", "id", "io", "json", "llm", "ml",
    "nlp", "os", "ram", "rest", "seo", "sql", "ui", "url", "ux", "xml",
];

const CODE_KEYWORDS: &[&str] = &[
    "async", "await", "console", "def", "elif", "fn", "func", "function", "impl", "import",
    "instanceof", "lambda", "nullptr", "print", "printf", "println", "return", "struct",
    "typeof", "undefined", "var", "void",
];

const QUESTION_WORDS: &[&str] = &["how", "what", "when", "where", "which", "who", "whom", "whose", "why"];

const NOUN_PHRASE_PATTERNS: &[&str] = &[
    "NOUN",
    "PROPN",
    "ADJ NOUN",
    "NOUN NOUN",
    "PROPN PROPN",
    "PROPN NOUN",
    "NUM NOUN",
    "ADJ PROPN",
    "ADJ ADJ NOUN",
    "ADJ NOUN NOUN",
    "NOUN NOUN NOUN",
    "PROPN PROPN PROPN",
    "PROPN ADP PROPN",
    "ADJ NOUN NOUN NOUN",
    "PROPN PROPN PROPN PROPN",
];

const COMPOUND_PATTERNS: &[&str] = &[
    "ADJ NOUN",
    "NOUN NOUN",
    "PROPN PROPN",
    "PROPN NOUN",
    "ADJ ADJ NOUN",
    "ADJ NOUN NOUN",
    "NOUN NOUN NOUN",
];

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pagegraph/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PipelineError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pagegraph/pagegraph.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PipelineError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PipelineError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PipelineError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
