//! Integration tests for the bridge: retries, circuit breaking and fallbacks
//! against a scripted transport.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::cast_precision_loss,
    clippy::doc_markdown
)]

use async_trait::async_trait;
use memconsult::bridge::components::{EMBED, EMBEDDING};
use memconsult::bridge::{
    BreakerState, BridgeError, BridgeRequest, BridgeResponse, BridgeTransport, ReplyOrigin,
};
use memconsult::config::BridgeConfig;
use memconsult::{Bridge, Context, Coordinator, EngineConfig, StrategyKind};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Transport whose health can be flipped mid-test.
#[derive(Default)]
struct ScriptedTransport {
    healthy: AtomicBool,
    garbled: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl BridgeTransport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn send(&self, request: &BridgeRequest) -> Result<String, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.garbled.load(Ordering::SeqCst) {
            return Ok("<html>502 Bad Gateway</html>".to_string());
        }
        let response = if self.healthy.load(Ordering::SeqCst) {
            BridgeResponse::success(request, json!([0.25, 0.5, 0.25]))
        } else {
            BridgeResponse::failure(request, "model not loaded")
        };
        serde_json::to_string(&response).map_err(|e| BridgeError::Malformed(e.to_string()))
    }
}

fn config() -> BridgeConfig {
    BridgeConfig {
        max_retries: 0,
        retry_backoff_ms: 1,
        breaker_failure_threshold: 2,
        breaker_cooldown_ms: 100,
        response_cache_size: 0,
        ..BridgeConfig::default()
    }
}

fn bridge_with(config: BridgeConfig) -> (Bridge, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::default());
    let bridge = Bridge::new(config, Arc::clone(&transport) as Arc<dyn BridgeTransport>);
    (bridge, transport)
}

async fn embed(bridge: &Bridge) -> memconsult::bridge::BridgeReply {
    bridge
        .invoke(EMBEDDING, EMBED, vec![json!("rotate keys")])
        .await
        .unwrap()
}

#[tokio::test]
async fn test_breaker_opens_and_short_circuits() {
    let (bridge, transport) = bridge_with(config());

    let first = embed(&bridge).await;
    assert_eq!(first.origin, ReplyOrigin::Fallback);
    assert_eq!(bridge.breaker_state(EMBEDDING), BreakerState::Closed);

    embed(&bridge).await;
    assert_eq!(transport.calls(), 2);
    assert_eq!(bridge.breaker_state(EMBEDDING), BreakerState::Open);

    // Open breaker: the transport is not touched, the fallback still answers.
    let rejected = embed(&bridge).await;
    assert_eq!(transport.calls(), 2);
    assert_eq!(rejected.origin, ReplyOrigin::Fallback);
    assert!(matches!(
        rejected.degraded_by,
        Some(BridgeError::CircuitOpen { .. })
    ));
    assert_eq!(bridge.stats().circuit_rejections, 1);
}

#[tokio::test]
async fn test_half_open_success_closes_breaker() {
    let (bridge, transport) = bridge_with(config());
    embed(&bridge).await;
    embed(&bridge).await;
    assert_eq!(bridge.breaker_state(EMBEDDING), BreakerState::Open);

    tokio::time::sleep(Duration::from_millis(150)).await;
    transport.set_healthy(true);

    let reply = embed(&bridge).await;
    assert_eq!(reply.origin, ReplyOrigin::Remote);
    assert_eq!(reply.result, json!([0.25, 0.5, 0.25]));
    assert_eq!(transport.calls(), 3);
    assert_eq!(bridge.breaker_state(EMBEDDING), BreakerState::Closed);
    assert_eq!(
        bridge.breaker_snapshot(EMBEDDING).unwrap().consecutive_failures,
        0
    );
}

#[tokio::test]
async fn test_half_open_failure_reopens() {
    let (bridge, transport) = bridge_with(config());
    embed(&bridge).await;
    embed(&bridge).await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    embed(&bridge).await;
    assert_eq!(transport.calls(), 3);
    assert_eq!(bridge.breaker_state(EMBEDDING), BreakerState::Open);

    embed(&bridge).await;
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_breakers_are_per_component() {
    let (bridge, transport) = bridge_with(config());
    embed(&bridge).await;
    embed(&bridge).await;
    assert_eq!(bridge.breaker_state(EMBEDDING), BreakerState::Open);

    transport.set_healthy(true);
    let reply = bridge
        .invoke("cross_encoder", "score", vec![json!("q"), json!(["a"]), json!(0.2)])
        .await
        .unwrap();
    assert_eq!(reply.origin, ReplyOrigin::Remote);
    assert_eq!(bridge.breaker_state("cross_encoder"), BreakerState::Closed);
}

#[tokio::test]
async fn test_retries_before_recording_failure() {
    let (bridge, transport) = bridge_with(BridgeConfig {
        max_retries: 2,
        ..config()
    });
    let reply = embed(&bridge).await;
    assert!(reply.is_degraded());
    assert_eq!(transport.calls(), 3);

    let stats = bridge.stats();
    assert_eq!(stats.remote_attempts, 3);
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.remote_failures, 1);
    // One final failure, below the threshold of two.
    assert_eq!(bridge.breaker_state(EMBEDDING), BreakerState::Closed);
}

#[tokio::test]
async fn test_malformed_response_degrades() {
    let (bridge, transport) = bridge_with(config());
    transport.garbled.store(true, Ordering::SeqCst);
    let reply = embed(&bridge).await;
    assert_eq!(reply.origin, ReplyOrigin::Fallback);
    assert!(matches!(reply.degraded_by, Some(BridgeError::Malformed(_))));
}

#[tokio::test]
async fn test_consultation_survives_open_breakers() {
    let (bridge, _transport) = bridge_with(config());
    let coordinator = Coordinator::with_bridge(EngineConfig::default(), bridge).unwrap();

    for topic in ["rollback", "canary", "hotfix"] {
        let result = coordinator
            .consult(
                format!("search the deploy runbook for {topic} steps"),
                &Context::new().with_hint(StrategyKind::Reranking),
            )
            .await;
        assert!(result.success);
    }
    assert_eq!(
        coordinator.bridge().breaker_state(EMBEDDING),
        BreakerState::Open
    );
    assert!(coordinator.metrics().bridge.fallbacks > 0);
}
