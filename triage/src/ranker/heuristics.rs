//! Static per-category remediation table.

use crate::record::FailureType;

/// A canned suggestion and its weight relative to classification confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heuristic {
    pub description: &'static str,
    pub weight: f64,
}

const fn h(description: &'static str, weight: f64) -> Heuristic {
    Heuristic {
        description,
        weight,
    }
}

const TIMEOUT: &[Heuristic] = &[
    h("Increase wait timeout (consider animation/loading time)", 0.9),
    h("Add explicit wait for element state (visible/stable)", 0.85),
    h("Wait for network idle before asserting on dynamic content", 0.6),
];

const SELECTOR: &[Heuristic] = &[
    h("Update selector; the UI structure may have changed", 0.9),
    h("Use more stable selectors (data-testid, aria-label)", 0.75),
    h("Check recent deployments for UI changes", 0.7),
];

const NETWORK: &[Heuristic] = &[
    h("Add retry logic with exponential backoff", 0.85),
    h("Check CI environment network stability", 0.7),
    h("Mock or stub external network calls in the test", 0.6),
];

const DATA_SETUP: &[Heuristic] = &[
    h("Review test data setup and ensure cleanup between runs", 0.9),
    h("Use unique identifiers to prevent data conflicts", 0.8),
    h("Add database reset in test teardown", 0.7),
];

const ENVIRONMENT: &[Heuristic] = &[
    h("Check environment configuration", 0.85),
    h("Verify dependencies and services are running", 0.8),
    h("Pin dependency versions used by the CI image", 0.6),
];

const UNKNOWN: &[Heuristic] = &[
    h("Re-run test to confirm failure is reproducible", 0.8),
    h("Review recent code changes", 0.7),
    h("Check CI logs for environment issues", 0.6),
];

pub fn heuristics_for(category: FailureType) -> &'static [Heuristic] {
    match category {
        FailureType::Timeout => TIMEOUT,
        FailureType::Selector => SELECTOR,
        FailureType::Network => NETWORK,
        FailureType::DataSetup => DATA_SETUP,
        FailureType::Environment => ENVIRONMENT,
        FailureType::Unknown => UNKNOWN,
    }
}

/// The selector suggestion made concrete when the failing selector is known.
pub fn concrete_selector_suggestion(selector: &str) -> String {
    format!("Update selector '{selector}'; the UI structure may have changed")
}
