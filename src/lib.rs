//! # memconsult
//!
//! Memory consultation coordination engine.
//!
//! A host application hands the engine a query and gets back one aggregated
//! answer. Internally the engine classifies the query, picks and orders the
//! retrieval strategies worth running, executes them (reaching across a process
//! boundary through the [`bridge`] where a strategy needs a remote model),
//! merges and caches the results, and falls back step by step until something
//! answers.
//!
//! ## Features
//!
//! - Cross-process bridge with per-component circuit breakers, retry with
//!   exponential backoff, response caching and local fallbacks
//! - Hybrid retrieval (weighted reciprocal rank fusion over BM25 + vectors)
//! - Extract–Cognify–Load pipeline turning text into entities and relationships
//! - Adaptive-TTL, compressed, capacity-bounded result cache with preloading
//! - A public contract that never raises for operational failures
//!
//! ## Example
//!
//! ```rust,ignore
//! use memconsult::{Context, Coordinator, EngineConfig};
//!
//! let coordinator = Coordinator::new(EngineConfig::default())?;
//! let result = coordinator
//!     .consult("find error handling pattern in auth.py", &Context::default())
//!     .await;
//! println!("confidence {:.2}", result.confidence_score);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod bridge;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod embedding;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod router;
pub mod rules;
pub mod scoring;
pub mod storage;
pub mod strategies;

pub use bridge::{Bridge, BridgeError, BridgeReply, BridgeRequest, BridgeResponse};
pub use cache::{CacheKey, IntelligentCache};
pub use config::EngineConfig;
pub use coordinator::{Coordinator, EngineMetricsSnapshot};
pub use models::{
    AggregatedResult, Complexity, Context, Entity, EntityType, Query, QueryAnalysis, QueryType,
    Relationship, RelationshipType, RoutingDecision, StrategyKind, StrategyResult,
};
pub use router::QueryRouter;

/// Error type for engine operations.
///
/// Strategy executors and the coordinator never surface these to the external
/// caller for ordinary operational failures: they are captured into
/// [`StrategyResult`]s or degrade to cache misses and fallbacks. The only
/// variant a host sees from the public surface is [`Error::InvalidConfig`],
/// raised while constructing a [`Coordinator`].
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidConfig` | Configuration violates a construction-time contract |
/// | `InvalidInput` | Empty query text, malformed document, bad CLI arguments |
/// | `OperationFailed` | SQLite, filesystem or serialization failures |
/// | `BridgeTimeout` | A remote call exceeded its timeout after all retries |
/// | `BridgeExecution` | A remote call failed or returned `success: false` |
/// | `CircuitOpen` | A component's breaker rejected the call pre-emptively |
/// | `MalformedEnvelope` | Transport returned a response that does not match the schema |
/// | `StrategyFailure` | A strategy executor failed, timed out or panicked |
/// | `CacheIo` | Cache compression, serialization or persistence failed |
/// | `AggregationFailure` | Aggregated output could not be assembled |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Configuration violates a construction-time contract.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A bridge call timed out.
    #[error("bridge call {component}.{method} timed out after {timeout_ms}ms")]
    BridgeTimeout {
        /// Remote component name.
        component: String,
        /// Remote method name.
        method: String,
        /// Per-attempt timeout in milliseconds.
        timeout_ms: u64,
    },

    /// A bridge call failed on the remote side or in transport.
    #[error("bridge call {component}.{method} failed: {cause}")]
    BridgeExecution {
        /// Remote component name.
        component: String,
        /// Remote method name.
        method: String,
        /// The underlying cause.
        cause: String,
    },

    /// The circuit breaker for a component is open.
    #[error("circuit open for component '{component}'")]
    CircuitOpen {
        /// Remote component name.
        component: String,
    },

    /// A response envelope did not match the bridge schema.
    #[error("malformed bridge envelope: {0}")]
    MalformedEnvelope(String),

    /// A strategy executor failed.
    #[error("strategy '{strategy}' failed: {cause}")]
    StrategyFailure {
        /// Strategy name.
        strategy: String,
        /// The underlying cause.
        cause: String,
    },

    /// Cache I/O failed. Always degraded to a miss by callers.
    #[error("cache io error: {0}")]
    CacheIo(String),

    /// Aggregated output could not be assembled.
    #[error("aggregation failed: {0}")]
    AggregationFailure(String),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
///
/// ```rust
/// use memconsult::current_timestamp;
///
/// assert!(current_timestamp() > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Acquires a mutex, recovering the inner value if a previous holder panicked.
pub(crate) fn acquire_lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("mutex was poisoned, recovering");
            metrics::counter!("mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}
