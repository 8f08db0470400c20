//! Cross-process bridge.
//!
//! [`Bridge::invoke`] calls a named method on a component living in another
//! runtime. Every call goes through the same pipeline:
//!
//! ```text
//! response cache hit? ──yes──> reply (cache)
//!        │ no
//! transport connected? ──no──> fallback chain
//!        │ yes
//! breaker allows? ──no──> fallback chain          (no remote call)
//!        │ yes
//! attempt ─fail─> backoff ─> attempt ... (max_retries)
//!        │ ok                     │ final failure
//! breaker success, cache     breaker failure, fallback chain
//! ```
//!
//! Callers receive a [`BridgeReply`] whether the answer came from the remote
//! side, the response cache or a fallback stage. An `Err` means no stage could
//! answer at all.

pub mod components;
mod breaker;
mod envelope;
mod error;
mod fallback;
mod response_cache;
mod transport;

pub use breaker::{BreakerSnapshot, BreakerState, CircuitBreaker};
pub use envelope::{BridgeRequest, BridgeResponse, PROTOCOL_VERSION};
pub use error::BridgeError;
pub use fallback::{FallbackChain, FallbackStage, component_local, stale_response_stage};
pub use response_cache::ResponseCache;
pub use transport::{BridgeTransport, DisconnectedTransport, SubprocessTransport};

use crate::acquire_lock;
use crate::config::BridgeConfig;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Where a reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOrigin {
    /// The remote component answered.
    Remote,
    /// A fresh cached remote answer.
    Cache,
    /// A fallback stage answered.
    Fallback,
}

impl ReplyOrigin {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Cache => "cache",
            Self::Fallback => "fallback",
        }
    }
}

/// Answer to a bridge call.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeReply {
    /// Component called.
    pub component: String,
    /// Method called.
    pub method: String,
    /// Result payload.
    pub result: Value,
    /// Origin of the payload.
    pub origin: ReplyOrigin,
    /// Fallback stage that answered, if any.
    pub fallback_stage: Option<&'static str>,
    /// Error that forced the fallback, if any.
    pub degraded_by: Option<BridgeError>,
}

impl BridgeReply {
    /// Whether the payload is a lower-quality local substitute.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self.origin, ReplyOrigin::Fallback)
    }
}

/// Bridge call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// Transport attempts made.
    pub remote_attempts: u64,
    /// Calls answered remotely.
    pub remote_successes: u64,
    /// Calls whose final attempt failed.
    pub remote_failures: u64,
    /// Retries performed.
    pub retries: u64,
    /// Calls answered from the response cache.
    pub cache_hits: u64,
    /// Calls answered by a fallback stage.
    pub fallbacks: u64,
    /// Calls short-circuited by an open breaker.
    pub circuit_rejections: u64,
}

#[derive(Debug, Default)]
struct Counters {
    remote_attempts: AtomicU64,
    remote_successes: AtomicU64,
    remote_failures: AtomicU64,
    retries: AtomicU64,
    cache_hits: AtomicU64,
    fallbacks: AtomicU64,
    circuit_rejections: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            remote_attempts: self.remote_attempts.load(Ordering::Relaxed),
            remote_successes: self.remote_successes.load(Ordering::Relaxed),
            remote_failures: self.remote_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
        }
    }
}

/// Cross-process invocation layer.
pub struct Bridge {
    config: BridgeConfig,
    transport: Arc<dyn BridgeTransport>,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    responses: Arc<ResponseCache>,
    fallbacks: FallbackChain,
    counters: Counters,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("transport", &self.transport.name())
            .field("fallbacks", &self.fallbacks)
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Creates a bridge over a transport with the standard fallback chain.
    #[must_use]
    pub fn new(config: BridgeConfig, transport: Arc<dyn BridgeTransport>) -> Self {
        let responses = Arc::new(ResponseCache::new(
            config.response_cache_size,
            Duration::from_secs(config.response_cache_ttl_secs),
        ));
        let fallbacks = FallbackChain::standard(Arc::clone(&responses));
        Self {
            config,
            transport,
            breakers: Mutex::new(HashMap::new()),
            responses,
            fallbacks,
            counters: Counters::default(),
        }
    }

    /// Creates a bridge with no remote runtime. Every call is served locally.
    #[must_use]
    pub fn disconnected(config: BridgeConfig) -> Self {
        Self::new(config, Arc::new(DisconnectedTransport))
    }

    /// Creates a bridge from configuration: a subprocess transport when
    /// `command` is set, otherwise disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] for an empty command.
    pub fn from_config(config: &BridgeConfig) -> crate::Result<Self> {
        match &config.command {
            Some(command) => {
                let transport = SubprocessTransport::new(command)?.with_timeout(config.timeout());
                Ok(Self::new(config.clone(), Arc::new(transport)))
            },
            None => Ok(Self::disconnected(config.clone())),
        }
    }

    /// Replaces the fallback chain.
    #[must_use]
    pub fn with_fallbacks(mut self, fallbacks: FallbackChain) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// Whether a remote runtime is configured.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Invokes `component.method(args)`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unavailable`] only when the remote call could not
    /// be made or failed and no fallback stage produced an answer.
    pub async fn invoke(
        &self,
        component: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<BridgeReply, BridgeError> {
        let request = BridgeRequest::new(component, method, args);
        let span = tracing::info_span!(
            "bridge.invoke",
            component = component,
            method = method,
            request_id = %request.request_id,
            origin = tracing::field::Empty,
        );
        let result = self.dispatch(&request).instrument(span.clone()).await;
        match &result {
            Ok(reply) => {
                span.record("origin", reply.origin.as_str());
                metrics::counter!(
                    "bridge_requests_total",
                    "component" => component.to_string(),
                    "method" => method.to_string(),
                    "origin" => reply.origin.as_str()
                )
                .increment(1);
            },
            Err(err) => {
                metrics::counter!(
                    "bridge_requests_total",
                    "component" => component.to_string(),
                    "method" => method.to_string(),
                    "origin" => "unavailable"
                )
                .increment(1);
                tracing::warn!(component, method, error = %err, "bridge call unanswered");
            },
        }
        result
    }

    async fn dispatch(&self, request: &BridgeRequest) -> Result<BridgeReply, BridgeError> {
        let key = ResponseCache::is_cacheable(&request.method)
            .then(|| ResponseCache::key(&request.component, &request.method, &request.args));

        if let Some(result) = key.as_deref().and_then(|k| self.responses.get(k)) {
            Counters::bump(&self.counters.cache_hits);
            return Ok(reply(request, result, ReplyOrigin::Cache, None, None));
        }

        if !self.transport.is_connected() {
            let error = BridgeError::Disconnected {
                component: request.component.clone(),
            };
            return self.fall_back(request, error);
        }

        if !self.allow(&request.component) {
            Counters::bump(&self.counters.circuit_rejections);
            metrics::counter!(
                "bridge_circuit_breaker_rejections_total",
                "component" => request.component.clone()
            )
            .increment(1);
            let error = BridgeError::CircuitOpen {
                component: request.component.clone(),
            };
            return self.fall_back(request, error);
        }

        match self.call_with_retry(request).await {
            Ok(result) => {
                Counters::bump(&self.counters.remote_successes);
                self.record_success(&request.component);
                if let Some(key) = key {
                    self.responses.put(key, result.clone());
                }
                Ok(reply(request, result, ReplyOrigin::Remote, None, None))
            },
            Err(error) => {
                Counters::bump(&self.counters.remote_failures);
                self.record_failure(&request.component);
                self.fall_back(request, error)
            },
        }
    }

    async fn call_with_retry(&self, request: &BridgeRequest) -> Result<Value, BridgeError> {
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            Counters::bump(&self.counters.remote_attempts);
            let started = Instant::now();
            let outcome =
                match tokio::time::timeout(self.config.timeout(), self.transport.send(request))
                    .await
                {
                    Ok(Ok(raw)) => BridgeResponse::parse(&raw, request),
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(BridgeError::Timeout {
                        component: request.component.clone(),
                        method: request.method.clone(),
                        timeout_ms: self.config.timeout_ms,
                    }),
                };
            self.record_attempt(request, started.elapsed(), outcome.as_ref().err());

            match outcome {
                Ok(result) => return Ok(result),
                Err(err) if attempt < max_attempts => {
                    let delay = self.config.backoff_for(attempt);
                    Counters::bump(&self.counters.retries);
                    metrics::counter!(
                        "bridge_retries_total",
                        "component" => request.component.clone()
                    )
                    .increment(1);
                    tracing::warn!(
                        component = %request.component,
                        method = %request.method,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "retrying bridge call"
                    );
                    tokio::time::sleep(delay).await;
                },
                Err(err) => return Err(err),
            }
        }
    }

    fn fall_back(
        &self,
        request: &BridgeRequest,
        error: BridgeError,
    ) -> Result<BridgeReply, BridgeError> {
        match self.fallbacks.resolve(request, &error) {
            Some((stage, result)) => {
                Counters::bump(&self.counters.fallbacks);
                metrics::counter!(
                    "bridge_fallbacks_total",
                    "component" => request.component.clone(),
                    "stage" => stage,
                    "reason" => error.kind()
                )
                .increment(1);
                tracing::debug!(
                    component = %request.component,
                    method = %request.method,
                    stage,
                    reason = error.kind(),
                    "bridge call served by fallback"
                );
                Ok(reply(
                    request,
                    result,
                    ReplyOrigin::Fallback,
                    Some(stage),
                    Some(error),
                ))
            },
            None => Err(BridgeError::Unavailable {
                component: request.component.clone(),
                method: request.method.clone(),
                cause: error.to_string(),
            }),
        }
    }

    fn allow(&self, component: &str) -> bool {
        let mut breakers = acquire_lock(&self.breakers);
        let breaker = self.breaker_entry(&mut breakers, component);
        let allowed = breaker.allow(component);
        let state = breaker.state();
        drop(breakers);
        record_breaker_state(component, state);
        allowed
    }

    fn record_success(&self, component: &str) {
        let mut breakers = acquire_lock(&self.breakers);
        let breaker = self.breaker_entry(&mut breakers, component);
        breaker.on_success(component);
        let state = breaker.state();
        drop(breakers);
        record_breaker_state(component, state);
    }

    fn record_failure(&self, component: &str) {
        let mut breakers = acquire_lock(&self.breakers);
        let breaker = self.breaker_entry(&mut breakers, component);
        let tripped = breaker.on_failure(component);
        let state = breaker.state();
        drop(breakers);
        record_breaker_state(component, state);
        if tripped {
            metrics::counter!(
                "bridge_circuit_breaker_trips_total",
                "component" => component.to_string()
            )
            .increment(1);
        }
    }

    fn breaker_entry<'a>(
        &self,
        breakers: &'a mut HashMap<String, CircuitBreaker>,
        component: &str,
    ) -> &'a mut CircuitBreaker {
        breakers.entry(component.to_string()).or_insert_with(|| {
            CircuitBreaker::new(
                self.config.breaker_failure_threshold,
                Duration::from_millis(self.config.breaker_cooldown_ms),
            )
        })
    }

    fn record_attempt(&self, request: &BridgeRequest, elapsed: Duration, error: Option<&BridgeError>) {
        let status = error.map_or("success", BridgeError::kind);
        metrics::histogram!(
            "bridge_request_duration_ms",
            "component" => request.component.clone(),
            "status" => status
        )
        .record(elapsed.as_secs_f64() * 1000.0);

        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if self.config.latency_slo_ms > 0 && elapsed_ms > self.config.latency_slo_ms {
            metrics::counter!(
                "bridge_latency_budget_exceeded_total",
                "component" => request.component.clone()
            )
            .increment(1);
        }
    }

    /// Current breaker state for a component. Unknown components are closed.
    #[must_use]
    pub fn breaker_state(&self, component: &str) -> BreakerState {
        acquire_lock(&self.breakers)
            .get(component)
            .map_or(BreakerState::Closed, CircuitBreaker::state)
    }

    /// Breaker snapshot for a component that has been called.
    #[must_use]
    pub fn breaker_snapshot(&self, component: &str) -> Option<BreakerSnapshot> {
        acquire_lock(&self.breakers)
            .get(component)
            .map(CircuitBreaker::snapshot)
    }

    /// Call counters.
    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        self.counters.snapshot()
    }

    /// Drops cached responses.
    pub fn clear_cache(&self) {
        self.responses.clear();
    }
}

fn reply(
    request: &BridgeRequest,
    result: Value,
    origin: ReplyOrigin,
    fallback_stage: Option<&'static str>,
    degraded_by: Option<BridgeError>,
) -> BridgeReply {
    BridgeReply {
        component: request.component.clone(),
        method: request.method.clone(),
        result,
        origin,
        fallback_stage,
        degraded_by,
    }
}

fn record_breaker_state(component: &str, state: BreakerState) {
    metrics::gauge!(
        "bridge_circuit_breaker_state",
        "component" => component.to_string()
    )
    .set(f64::from(state.gauge_value()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct EchoTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BridgeTransport for EchoTransport {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn send(&self, request: &BridgeRequest) -> Result<String, BridgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = BridgeResponse::success(request, json!({ "echo": request.args }));
            serde_json::to_string(&response).map_err(|e| BridgeError::Malformed(e.to_string()))
        }
    }

    #[tokio::test]
    async fn test_remote_then_cached() {
        let transport = Arc::new(EchoTransport {
            calls: AtomicUsize::new(0),
        });
        let bridge = Bridge::new(BridgeConfig::default(), transport.clone());

        let first = bridge
            .invoke("summarizer", "contextualize", vec![json!("a")])
            .await
            .unwrap();
        assert_eq!(first.origin, ReplyOrigin::Remote);
        assert_eq!(first.result, json!({ "echo": ["a"] }));

        let second = bridge
            .invoke("summarizer", "contextualize", vec![json!("a")])
            .await
            .unwrap();
        assert_eq!(second.origin, ReplyOrigin::Cache);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_side_effecting_calls_are_not_cached() {
        let transport = Arc::new(EchoTransport {
            calls: AtomicUsize::new(0),
        });
        let bridge = Bridge::new(BridgeConfig::default(), transport.clone());
        for _ in 0..2 {
            bridge
                .invoke(components::KNOWLEDGE_GRAPH, components::STORE, vec![json!({})])
                .await
                .unwrap();
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disconnected_serves_fallback_without_tripping() {
        let bridge = Bridge::disconnected(BridgeConfig {
            breaker_failure_threshold: 1,
            ..BridgeConfig::default()
        });
        for _ in 0..3 {
            let reply = bridge
                .invoke(components::EMBEDDING, components::EMBED, vec![json!("text")])
                .await
                .unwrap();
            assert_eq!(reply.origin, ReplyOrigin::Fallback);
            assert_eq!(reply.fallback_stage, Some("component_local"));
        }
        assert_eq!(bridge.breaker_state(components::EMBEDDING), BreakerState::Closed);
        assert_eq!(bridge.stats().remote_attempts, 0);
    }

    #[tokio::test]
    async fn test_unknown_component_unavailable() {
        let bridge = Bridge::disconnected(BridgeConfig::default());
        let err = bridge.invoke("vision", "caption", vec![]).await.unwrap_err();
        assert!(matches!(err, BridgeError::Unavailable { .. }));
    }

    #[test]
    fn test_from_config_selects_transport() {
        let bridge = Bridge::from_config(&BridgeConfig::default()).unwrap();
        assert!(!bridge.is_connected());

        let config = BridgeConfig {
            command: Some(vec!["python3".to_string(), "bridge.py".to_string()]),
            ..BridgeConfig::default()
        };
        assert!(Bridge::from_config(&config).unwrap().is_connected());

        let empty = BridgeConfig {
            command: Some(Vec::new()),
            ..BridgeConfig::default()
        };
        assert!(Bridge::from_config(&empty).is_err());
    }
}
