//! Deterministic bag-of-words cosine similarity.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z][a-z0-9]+").unwrap());

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "the", "to", "was", "with", "after", "test", "error",
];

/// Sparse term-frequency vector with a cached norm.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermVector {
    terms: BTreeMap<String, f64>,
    norm: f64,
}

impl TermVector {
    pub fn from_text(text: &str) -> Self {
        let lowered = text.to_lowercase();
        let mut terms: BTreeMap<String, f64> = BTreeMap::new();
        for m in TOKEN.find_iter(&lowered) {
            let token = m.as_str();
            if STOPWORDS.contains(&token) {
                continue;
            }
            *terms.entry(token.to_string()).or_insert(0.0) += 1.0;
        }
        let norm = terms.values().map(|v| v * v).sum::<f64>().sqrt();
        Self { terms, norm }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Cosine similarity in [0, 1]; 0 when either side is empty.
    pub fn cosine(&self, other: &TermVector) -> f64 {
        if self.norm == 0.0 || other.norm == 0.0 {
            return 0.0;
        }
        let (small, large) = if self.terms.len() <= other.terms.len() {
            (self, other)
        } else {
            (other, self)
        };
        let dot: f64 = small
            .terms
            .iter()
            .filter_map(|(t, v)| large.terms.get(t).map(|w| v * w))
            .sum();
        (dot / (self.norm * other.norm)).clamp(0.0, 1.0)
    }
}
