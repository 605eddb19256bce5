//! Static rule table: one rule per category, each a set of weighted token
//! patterns. Specific tokens outweigh generic ones.

use std::sync::LazyLock;

use regex::Regex;

use crate::record::FailureType;

/// A single weighted pattern.
#[derive(Debug)]
pub struct TokenPattern {
    pub label: &'static str,
    pub weight: f64,
    regex: Regex,
}

impl TokenPattern {
    fn new(label: &'static str, pattern: &str, weight: f64) -> Self {
        Self {
            label,
            weight,
            regex: Regex::new(&format!("(?i){pattern}")).unwrap(),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// All patterns for one category.
#[derive(Debug)]
pub struct CategoryRule {
    pub category: FailureType,
    pub patterns: Vec<TokenPattern>,
}

impl CategoryRule {
    /// Patterns of this rule that match `text`, each counted once.
    pub fn matched<'a>(&'a self, text: &str) -> Vec<&'a TokenPattern> {
        self.patterns.iter().filter(|p| p.is_match(text)).collect()
    }
}

type RuleSpec = (FailureType, &'static [(&'static str, &'static str, f64)]);

const RULE_SPECS: &[RuleSpec] = &[
    (
        FailureType::Timeout,
        &[
            ("TimeoutError", r"timeout_?error|timeoutexception", 0.35),
            ("timeout exceeded", r"timeout\s*\d+\s*m?s\s+exceeded", 0.3),
            ("deadline exceeded", r"deadline\s+exceeded", 0.3),
            ("timed out", r"\btimed?[\s_-]?out\b", 0.25),
            ("exceeded", r"\bexceeded\b", 0.08),
            ("wait", r"\bwait(?:ing|ed|s)?\b", 0.08),
        ],
    ),
    (
        FailureType::Selector,
        &[
            ("selector not found", r"selector\b[^\n]{0,80}?\bnot\s+found", 0.35),
            (
                "element not found",
                r"element\b[^\n]{0,80}?\bnot\s+(?:found|attached|interactable)",
                0.35,
            ),
            ("no such element", r"no\s*such\s*element", 0.35),
            ("stale element", r"stale\s+element", 0.3),
            ("not visible", r"\bnot\s+visible\b", 0.15),
            ("locator", r"\blocator\b", 0.15),
            ("selector", r"\bselector\b", 0.1),
            ("element", r"\belement\b", 0.08),
        ],
    ),
    (
        FailureType::Network,
        &[
            ("connection refused", r"econnrefused|connection\s+refused", 0.35),
            (
                "connection reset",
                r"econnreset|connection\s+reset|socket\s+hang\s+up",
                0.3,
            ),
            ("connect timeout", r"etimedout|connect\s+timeout", 0.3),
            ("dns failure", r"enotfound|getaddrinfo|name\s+resolution", 0.3),
            (
                "upstream 5xx",
                r"(?:http(?:/\d(?:\.\d)?)?|status(?:\s+code)?)[\s:=]*50[234]\b|\b50[234]\s+(?:bad\s+gateway|service\s+unavailable|gateway\s+timeout)",
                0.25,
            ),
            ("request error", r"request_?error|fetch_?error", 0.15),
            ("network", r"\bnetwork\b", 0.15),
            ("connection", r"\bconnection\b", 0.08),
        ],
    ),
    (
        FailureType::DataSetup,
        &[
            ("duplicate key", r"duplicate\s+key", 0.35),
            (
                "constraint violation",
                r"(?:unique|foreign\s+key|not[\s-]null)\s+constraint|constraint\s+violat",
                0.3,
            ),
            ("fixture", r"\bfixtures?\b", 0.25),
            ("already exists", r"already\s+exists", 0.2),
            ("test data", r"test\s+data|seed(?:ing)?\s+data", 0.2),
            ("cleanup", r"\bclean[\s-]?up\b|\bteardown\b", 0.15),
            ("database", r"\bdatabase(?:_?error)?\b", 0.1),
        ],
    ),
    (
        FailureType::Environment,
        &[
            (
                "missing module",
                r"modulenotfounderror|no\s+module\s+named|cannot\s+find\s+module",
                0.35,
            ),
            ("command not found", r"command\s+not\s+found", 0.3),
            (
                "version mismatch",
                r"version\s+mismatch|incompatible\s+version|unsupported\s+version",
                0.3,
            ),
            ("permission denied", r"permission\s+denied|eacces", 0.3),
            ("resources exhausted", r"out\s+of\s+memory|no\s+space\s+left", 0.25),
            ("environment variable", r"environment\s+variable|env\s+var", 0.25),
            ("dependency", r"\bdependenc(?:y|ies)\b", 0.15),
            ("configuration", r"\bconfig(?:uration)?\b", 0.1),
            ("environment", r"\benvironment\b", 0.1),
        ],
    ),
];

static RULES: LazyLock<Vec<CategoryRule>> = LazyLock::new(|| {
    RULE_SPECS
        .iter()
        .map(|(category, patterns)| CategoryRule {
            category: *category,
            patterns: patterns
                .iter()
                .map(|(label, pattern, weight)| TokenPattern::new(label, pattern, *weight))
                .collect(),
        })
        .collect()
});

/// The rule for `category`; `None` for `Unknown`, which has no patterns.
pub fn rule_for(category: FailureType) -> Option<&'static CategoryRule> {
    RULES.iter().find(|r| r.category == category)
}

static SELECTOR_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:selector|element|locator)\s*(?:\(\s*)?["'`]([^"'`\n]{1,200})["'`]"#)
        .unwrap()
});

/// Pull a CSS/XPath selector out of phrases like `selector "#login"`.
pub fn extract_selector(text: &str) -> Option<String> {
    SELECTOR_PHRASE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}
