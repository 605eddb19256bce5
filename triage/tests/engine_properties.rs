//! End-to-end properties of the triage engine over deterministic stores.

use std::sync::Arc;

use triage::flakiness::NoHistory;
use triage::ranker::{is_near_duplicate, LIKELY_FLAKY_SUGGESTION};
use triage::retrieval::EmptyRetriever;
use triage::{
    EngineConfig, FailureRecord, FailureType, HistoricalRecord, InMemoryHistory, Resolution,
    RetryOutcome, RuleBasedExplainer, SuggestionSource, TriageEngine, TriageReport,
};

// ── Helpers ────────────────────────────────────────────────────────────────

fn history() -> Arc<InMemoryHistory> {
    let login = FailureRecord::new("test_user_login", "TimeoutError: Timeout 30000ms exceeded.")
        .with_excerpt([r##"waiting for selector "#user-dashboard" to be visible"##]);
    let login_fix = Resolution::new(
        &login,
        FailureType::Timeout,
        "Increased wait timeout to 60s and added waitForLoadState('networkidle')",
    )
    .with_root_cause("Dashboard loads slowly under CI load")
    .confirmed();

    let cart = FailureRecord::new(
        "test_add_to_cart",
        "Element with selector button[data-test-id='add-cart'] not found",
    );
    let cart_fix = Resolution::new(
        &cart,
        FailureType::Selector,
        "Updated selector to .btn-primary.add-to-cart",
    )
    .confirmed();

    let search = FailureRecord::new("test_api_search", "RequestError: connect ETIMEDOUT")
        .with_retry(RetryOutcome::passed(1));
    let search_fix = Resolution::new(
        &search,
        FailureType::Network,
        "Add retry logic with exponential backoff",
    );

    Arc::new(InMemoryHistory::from_records([
        HistoricalRecord::new(login, Some(login_fix)).with_id("h-1"),
        HistoricalRecord::new(cart, Some(cart_fix)).with_id("h-2"),
        HistoricalRecord::new(search, Some(search_fix)).with_id("h-3"),
    ]))
}

fn engine_with(store: Arc<InMemoryHistory>) -> TriageEngine {
    TriageEngine::new(
        EngineConfig::default(),
        store.clone(),
        store,
        Arc::new(RuleBasedExplainer),
    )
    .unwrap()
}

fn empty_engine() -> TriageEngine {
    TriageEngine::new(
        EngineConfig::default(),
        Arc::new(EmptyRetriever),
        Arc::new(NoHistory),
        Arc::new(RuleBasedExplainer),
    )
    .unwrap()
}

fn assert_report_invariants(report: &TriageReport) {
    let c = report.classification();
    assert!((0.0..=1.0).contains(&c.confidence));
    assert!((0.0..=1.0).contains(&report.flakiness_probability()));
    assert!((0.0..=1.0).contains(&report.overall_confidence()));
    assert!(!report.root_cause_explanation().is_empty());

    let actions = report.suggested_actions();
    for pair in actions.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }
    for (i, a) in actions.iter().enumerate() {
        for b in &actions[i + 1..] {
            assert!(!is_near_duplicate(&a.description, &b.description));
        }
    }
    for pair in report.similar_failures().windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
}

fn corpus() -> Vec<FailureRecord> {
    let messages = [
        "TimeoutError: selector '#user-dashboard' not visible",
        "TimeoutError: Timeout 30000ms exceeded.",
        "Element with selector button[data-test-id='add-cart'] not found",
        "RequestError: connect ETIMEDOUT 10.0.1.42:443",
        "Error: connect ECONNREFUSED 127.0.0.1:5432",
        r#"DatabaseError: duplicate key value violates unique constraint "products_sku_key""#,
        "ModuleNotFoundError: No module named 'playwright'",
        "AssertionError: expected 3 to equal 4",
        "wait for element",
    ];
    let retry_sets: [Vec<RetryOutcome>; 3] = [
        vec![],
        vec![RetryOutcome::failed(1), RetryOutcome::passed(2)],
        vec![RetryOutcome::failed(1), RetryOutcome::failed(2)],
    ];
    let mut records = Vec::new();
    for (i, msg) in messages.iter().enumerate() {
        for retries in &retry_sets {
            let mut record = FailureRecord::new(format!("test_case_{i}"), *msg);
            record.retry_outcomes = retries.clone();
            records.push(record);
        }
    }
    records
}

// ── Scenarios ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_timeout_scenario() {
    let report = empty_engine()
        .triage(FailureRecord::new(
            "test_user_login",
            "TimeoutError: selector '#user-dashboard' not visible",
        ))
        .await
        .unwrap();

    assert_eq!(report.classification().category, FailureType::Timeout);
    let prior = FailureType::Timeout.flakiness_prior();
    assert!(report.flakiness_probability() > 0.0);
    assert!(report.flakiness_probability() <= prior);
    assert!(report
        .suggested_actions()
        .iter()
        .any(|a| a.source == SuggestionSource::Heuristic
            && a.description.to_lowercase().contains("wait")));
}

#[tokio::test]
async fn test_retry_pass_scenario() {
    let record = FailureRecord::new("test_api_search", "RequestError: socket hang up")
        .with_retry(RetryOutcome::failed(1))
        .with_retry(RetryOutcome::passed(2));
    let report = empty_engine().triage(record).await.unwrap();
    assert!(report.flakiness_probability() >= 0.6);
}

#[tokio::test]
async fn test_empty_store_gives_only_heuristics() {
    let store = Arc::new(InMemoryHistory::new());
    let engine = engine_with(store);
    for record in corpus() {
        let report = engine.triage(record).await.unwrap();
        assert!(report.similar_failures().is_empty());
        assert!(report.overall_confidence().is_finite());
        assert!(report
            .suggested_actions()
            .iter()
            .all(|a| a.source == SuggestionSource::Heuristic));
    }
}

#[tokio::test]
async fn test_history_fix_surfaces_for_similar_failure() {
    let engine = engine_with(history());
    let record = FailureRecord::new("test_user_login", "TimeoutError: Timeout 45000ms exceeded.")
        .with_excerpt([r##"waiting for selector "#user-dashboard" to be visible"##]);
    let report = engine.triage(record).await.unwrap();

    assert_eq!(report.similar_failures()[0].record_id, "h-1");
    assert!(report.suggested_actions().iter().any(|a| a.source
        == SuggestionSource::Historical
        && a.description.starts_with("Apply similar fix: Increased wait timeout")));
    assert!(report
        .root_cause_explanation()
        .contains("previously resolved by: Increased wait timeout"));
}

#[tokio::test]
async fn test_flaky_network_scenario() {
    let engine = engine_with(history());
    let record = FailureRecord::new("test_api_search", "RequestError: connect ETIMEDOUT 10.0.1.42:443")
        .with_retry(RetryOutcome::failed_with(1, "RequestError: socket hang up"))
        .with_retry(RetryOutcome::passed(2));
    let report = engine.triage(record).await.unwrap();

    assert_eq!(report.classification().category, FailureType::Network);
    assert!(report.flakiness_probability() > 0.7);
    assert_eq!(report.suggested_actions()[0].description, LIKELY_FLAKY_SUGGESTION);
    // The unconfirmed historical retry fix and the heuristic collapse into one.
    let retry_like = report
        .suggested_actions()
        .iter()
        .filter(|a| a.description.to_lowercase().contains("retry logic"))
        .count();
    assert_eq!(retry_like, 1);
}

// ── Properties ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn prop_reports_respect_invariants() {
    let engine = engine_with(history());
    for record in corpus() {
        let report = engine.triage(record).await.unwrap();
        assert_report_invariants(&report);
    }
}

#[tokio::test]
async fn prop_idempotent_over_static_store() {
    let engine = engine_with(history());
    for record in corpus() {
        let first = engine.triage(record.clone()).await.unwrap();
        let second = engine.triage(record).await.unwrap();
        assert_eq!(first, second);
    }
}

#[tokio::test]
async fn prop_passing_retry_never_lowers_flakiness() {
    let engine = engine_with(history());
    for record in corpus() {
        let before = engine.triage(record.clone()).await.unwrap();
        let n = record.retry_outcomes.len() as u32 + 1;

        let with_pass = record.clone().with_retry(RetryOutcome::passed(n));
        let after = engine.triage(with_pass).await.unwrap();
        assert!(after.flakiness_probability() >= before.flakiness_probability());

        let with_fail = record.with_retry(RetryOutcome::failed(n));
        let after = engine.triage(with_fail).await.unwrap();
        assert!(after.flakiness_probability() <= before.flakiness_probability());
    }
}

#[tokio::test]
async fn prop_category_from_closed_set() {
    let engine = empty_engine();
    for record in corpus() {
        let report = engine.triage(record).await.unwrap();
        assert!(FailureType::ALL.contains(&report.classification().category));
    }
}
