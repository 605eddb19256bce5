//! Failure signatures: normalized fingerprints of error messages.
//!
//! Two failures that differ only in volatile details (quoted selectors, ids,
//! durations, ports) share a signature. History matching and retry
//! comparison both key on it.

use std::sync::LazyLock;

use regex::Regex;

/// Signatures longer than this are truncated (on a char boundary).
pub const MAX_SIGNATURE_LEN: usize = 160;

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]*"|'[^']*'|`[^`]*`"#).unwrap());

static HEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b0x[0-9a-f]+\b|\b[0-9a-f]*[0-9][0-9a-f]*[a-f][0-9a-f]*\b").unwrap());

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Compute the normalized signature of an error message.
pub fn failure_signature(message: &str) -> String {
    let lowered = message.to_lowercase();
    let text = QUOTED.replace_all(&lowered, "<str>");
    let text = HEX.replace_all(&text, |caps: &regex::Captures| {
        let token = &caps[0];
        if token.starts_with("0x") || token.len() >= 8 {
            "<hex>".to_string()
        } else {
            token.to_string()
        }
    });
    let text = DIGITS.replace_all(&text, "<n>");
    let text = WHITESPACE.replace_all(text.trim(), " ");
    text.chars().take(MAX_SIGNATURE_LEN).collect()
}
