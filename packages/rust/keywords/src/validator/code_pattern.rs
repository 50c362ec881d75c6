//! Rejects text that looks like source code or a shell session.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use pagegraph_shared::ValidatorConfig;

use crate::analysis::Analysis;

static OPERATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"==|!=|<=|>=|=>|->|::|\+\+|&&|\|\||[=;{}<>]").expect("valid regex")
});

static REPL_PROMPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:>>>|\.\.\.\s|\$\s|#\s|In \[\d*\]:|irb\(|>\s)").expect("valid regex")
});

static LITERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:true|false|null|none|nil|undefined|nan)\s*$").expect("valid regex")
});

static CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][\w.]*\s*\([^)]*\)").expect("valid regex"));

static CAMEL_CASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z]+[A-Z][A-Za-z0-9]*\b").expect("valid regex"));

static ARITHMETIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*[-+*/%^]\s*\d+").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct CodePatternRule {
    abbreviations: HashSet<String>,
    code_keywords: HashSet<String>,
}

impl CodePatternRule {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            abbreviations: config.abbreviations.iter().map(|w| w.to_lowercase()).collect(),
            code_keywords: config.code_keywords.iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    pub fn check(&self, text: &str, _analysis: &Analysis) -> Result<(), String> {
        let lower = text.trim().to_lowercase();
        if self.abbreviations.contains(&lower) {
            return Ok(());
        }

        if let Some(kw) = lower
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .find(|t| self.code_keywords.contains(*t))
        {
            return Err(format!("contains code keyword `{kw}`"));
        }

        let checks: [(&Regex, &str); 6] = [
            (&*REPL_PROMPT_RE, "starts with a REPL prompt"),
            (&*OPERATOR_RE, "contains an operator symbol"),
            (&*LITERAL_RE, "is a code literal"),
            (&*CALL_RE, "has a function-call shape"),
            (&*CAMEL_CASE_RE, "contains a camelCase identifier"),
            (&*ARITHMETIC_RE, "contains an arithmetic expression"),
        ];
        for (re, reason) in checks {
            if re.is_match(text) {
                return Err(reason.to_string());
            }
        }
        Ok(())
    }
}
