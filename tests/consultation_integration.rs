//! End-to-end consultation tests over on-disk stores.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::too_many_lines,
    clippy::doc_markdown
)]

use memconsult::config::FeatureFlags;
use memconsult::models::Document;
use memconsult::storage::PreferenceRecord;
use memconsult::{Context, Coordinator, EngineConfig, QueryType, StrategyKind};
use test_case::test_case;

const CORPUS: &[(&str, &str)] = &[
    (
        "keys",
        "Rotate the signing keys every ninety days and revoke the old key after rollout.",
    ),
    (
        "backoff",
        "Use exponential backoff with jitter when the token service times out.",
    ),
    (
        "theme",
        "The dashboard uses dark mode by default; light mode is opt-in.",
    ),
];

const AUTH_MODULE: &str = r#"import logging

class TokenRefresher:
    def __init__(self, client, retries=3):
        self.client = client
        self.retries = retries

    def refresh(self, token):
        for attempt in range(self.retries):
            try:
                return self.client.exchange(token)
            except TimeoutError as error:
                logging.warning("refresh attempt %s failed: %s", attempt, error)
        raise RuntimeError("token refresh exhausted retries")

def validate_token(token):
    if not token:
        raise ValueError("empty token")
    return token.startswith("Bearer ")
"#;

async fn seeded(config: EngineConfig) -> Coordinator {
    let coordinator = Coordinator::new(config).unwrap();
    for (id, content) in CORPUS {
        coordinator
            .ingest(Document::new(*content).with_id(*id))
            .await
            .unwrap();
    }
    coordinator
}

fn first_recall_id(result: &memconsult::AggregatedResult) -> Option<String> {
    let recall = result.strategy(StrategyKind::MemoryRecall)?;
    recall.data.as_ref()?["results"][0]["id"]
        .as_str()
        .map(str::to_string)
}

#[tokio::test]
async fn test_documents_persist_across_coordinators() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::default().with_data_dir(dir.path());

    let first = seeded(config.clone()).await;
    assert_eq!(first.document_count().unwrap(), CORPUS.len());
    first.shutdown();
    drop(first);

    let second = Coordinator::new(config).unwrap();
    assert_eq!(second.document_count().unwrap(), CORPUS.len());
    let result = second
        .consult("when do we rotate signing keys", &Context::new())
        .await;
    assert!(result.success);
    assert_eq!(first_recall_id(&result).as_deref(), Some("keys"));
}

#[tokio::test]
async fn test_search_query_fuses_both_sources() {
    let coordinator = seeded(EngineConfig::default()).await;
    let result = coordinator
        .consult("find how the token service handles timeouts", &Context::new())
        .await;

    let routing = result.routing.as_ref().unwrap();
    assert_eq!(routing.analysis.query_type, QueryType::SearchQuery);
    assert!(result.successful_strategies.contains(&StrategyKind::HybridSearch));

    let hybrid = result.strategy(StrategyKind::HybridSearch).unwrap();
    let data = hybrid.data.as_ref().unwrap();
    let fused = data["results"].as_array().unwrap();
    let backoff = fused.iter().find(|hit| hit["hit"]["id"] == "backoff").unwrap();
    assert_eq!(backoff["boosted"], true);
    assert_eq!(backoff["provenance"].as_array().unwrap().len(), 2);

    let scores: Vec<f64> = fused.iter().map(|hit| hit["score"].as_f64().unwrap()).collect();
    assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[tokio::test]
async fn test_code_context_runs_agentic_analysis_and_pipeline() {
    let coordinator = Coordinator::new(EngineConfig::default()).unwrap();
    let context = Context::new()
        .with_source("editor")
        .with_field(Context::CODE_FIELD, AUTH_MODULE);
    let result = coordinator
        .consult("explain the error handling in this class", &context)
        .await;

    assert!(result.success);
    let routing = result.routing.as_ref().unwrap();
    assert!(routing.analysis.requires_code_analysis);
    assert!(
        routing
            .execution_order
            .contains(&StrategyKind::AgenticAnalysis)
    );

    let agentic = result.strategy(StrategyKind::AgenticAnalysis).unwrap();
    assert!(agentic.success);
    let blocks = agentic.data.as_ref().unwrap()["results"].as_array().unwrap();
    assert!(!blocks.is_empty());
    assert_eq!(blocks[0]["language"], "python");

    let stats = coordinator.graph_stats().unwrap();
    assert!(stats.entity_count > 0);
}

#[tokio::test]
async fn test_confidence_is_success_ratio() {
    let coordinator = seeded(EngineConfig::default()).await;
    let result = coordinator
        .consult("search for the signing key rotation policy", &Context::new())
        .await;

    let total = result.total_strategies();
    assert!(total >= 2);
    let expected = result.successful_strategies.len() as f32 / total as f32;
    assert!((result.confidence_score - expected).abs() < 1e-6);
    assert_eq!(total, result.combined_data.len());
}

#[tokio::test]
async fn test_disabled_strategy_never_runs() {
    let mut config = EngineConfig::default();
    config.features = FeatureFlags::all().disable(StrategyKind::HybridSearch);
    let coordinator = seeded(config).await;

    let result = coordinator
        .consult(
            "search for dark mode",
            &Context::new().with_hint(StrategyKind::HybridSearch),
        )
        .await;
    assert!(result.strategy(StrategyKind::HybridSearch).is_none());
    assert!(result.success);
}

#[tokio::test]
async fn test_missing_critical_path_gates_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.features = FeatureFlags::all().require_path(
        StrategyKind::AgenticAnalysis,
        dir.path().join("missing-rules.toml"),
    );
    let coordinator = Coordinator::new(config).unwrap();

    let decision = coordinator.route(
        &"fix the crash in parser.rs".into(),
        &Context::new(),
    );
    assert!(
        !decision
            .selected_strategies
            .contains(&StrategyKind::AgenticAnalysis)
    );
    assert!(decision.selected_strategies.contains(&StrategyKind::BASE));
}

#[tokio::test]
async fn test_recall_includes_corrections_and_preferences() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("corrections.log");
    std::fs::write(
        &log,
        "2024-03-02 rotate keys quarterly, not yearly\n2024-04-11 prefer tabs in makefiles\n",
    )
    .unwrap();

    let mut config = EngineConfig::default();
    config.features.corrections_log = Some(log);
    let coordinator = seeded(config)
        .await
        .with_preferences(vec![PreferenceRecord::new("keys", "rotate with the ops runbook")]);

    let result = coordinator.consult("rotate keys", &Context::new()).await;
    let recall = result.strategy(StrategyKind::MemoryRecall).unwrap();
    let data = recall.data.as_ref().unwrap();
    assert_eq!(data["corrections"].as_array().unwrap().len(), 1);
    assert_eq!(data["corrections"][0]["line_number"], 1);
    assert_eq!(data["preferences"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_ingest_invalidates_cached_results() {
    let coordinator = seeded(EngineConfig::default()).await;
    let context = Context::new();

    let before = coordinator.consult("incident postmortem template", &context).await;
    assert!(!before.from_cache);
    let cached = coordinator.consult("incident postmortem template", &context).await;
    assert!(cached.from_cache);

    coordinator
        .ingest(Document::new("Every incident postmortem uses the blameless template.").with_id("pm"))
        .await
        .unwrap();
    let after = coordinator.consult("incident postmortem template", &context).await;
    assert!(!after.from_cache);
    assert_eq!(first_recall_id(&after).as_deref(), Some("pm"));
}

#[tokio::test]
async fn test_ingest_invalidates_persisted_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.cache.persist_dir = Some(dir.path().join("cache"));
    let coordinator = seeded(config.clone()).await;
    let context = Context::new();

    let before = coordinator.consult("incident postmortem template", &context).await;
    assert!(!before.from_cache);
    assert!(coordinator.consult("incident postmortem template", &context).await.from_cache);

    coordinator
        .ingest(Document::new("Every incident postmortem uses the blameless template.").with_id("pm"))
        .await
        .unwrap();
    let after = coordinator.consult("incident postmortem template", &context).await;
    assert!(!after.from_cache);
    assert_eq!(coordinator.cache_stats().disk_hits, 0);
    assert_eq!(first_recall_id(&after).as_deref(), Some("pm"));
}

#[tokio::test]
async fn test_persisted_results_survive_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.cache.persist_dir = Some(dir.path().join("cache"));

    let first = seeded(config.clone()).await;
    assert!(!first.consult("dark mode default", &Context::new()).await.from_cache);
    first.shutdown();
    drop(first);

    let second = Coordinator::new(config).unwrap();
    let result = second.consult("dark mode default", &Context::new()).await;
    assert!(result.from_cache);
    assert_eq!(second.cache_stats().disk_hits, 1);
}

#[tokio::test]
async fn test_metrics_track_consultations() {
    let coordinator = seeded(EngineConfig::default()).await;
    coordinator.consult("dark mode default", &Context::new()).await;
    coordinator.consult("dark mode default", &Context::new()).await;
    coordinator.consult("backoff jitter", &Context::new()).await;

    let snapshot = coordinator.metrics();
    assert_eq!(snapshot.consultations, 3);
    assert_eq!(snapshot.cache_hits, 1);
    assert_eq!(snapshot.cache_misses, 2);
    let recall = &snapshot.strategies[StrategyKind::MemoryRecall.as_str()];
    assert_eq!(recall.runs, 2);
    assert_eq!(recall.failures, 0);
}

#[test_case("refactor this function into a trait", QueryType::CodeAnalysis ; "code")]
#[test_case("find similar deployment notes", QueryType::SearchQuery ; "search")]
#[test_case("find error handling pattern in auth.py", QueryType::ErrorAnalysis ; "error overrides")]
#[test_case("what did we decide previously about caching", QueryType::MemoryQuery ; "memory")]
#[test_case("hello there", QueryType::General ; "general")]
fn test_route_classifies(query: &str, expected: QueryType) {
    let coordinator = Coordinator::new(EngineConfig::default()).unwrap();
    let decision = coordinator.route(&query.into(), &Context::new());
    assert_eq!(decision.analysis.query_type, expected);
    assert_eq!(decision.execution_order[0], StrategyKind::BASE);
    assert!(decision.fallback_chain.contains(&StrategyKind::BASE));
}

#[test]
fn test_invalid_config_is_the_only_construction_error() {
    let mut config = EngineConfig::default();
    config.hybrid.keyword_weight = -0.1;
    let err = Coordinator::new(config).unwrap_err();
    assert!(err.to_string().contains("hybrid.keyword_weight"));
}
