//! Extract–Cognify–Load pipeline.
//!
//! Turns raw text into entities, then relationships, then persisted graph
//! records. The phases always run in order with no branching back:
//!
//! ```text
//! Extract ──> Cognify ──> Load
//! ```
//!
//! Each phase reports its own [`PhaseOutcome`]. A failed Extract hands Cognify
//! no entities; a failed Cognify hands Load no relationships. Load runs in
//! every case so whatever was extracted is still persisted.

mod cognify;
mod extract;
mod load;

pub use cognify::{CognifyOutput, cognify};
pub use extract::{ExtractOutput, extract};
pub use load::{LoadOutput, load};

use crate::bridge::Bridge;
use crate::config::PipelineConfig;
use crate::storage::KnowledgeGraphStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    /// Entity recognition.
    Extract,
    /// Relationship inference.
    Cognify,
    /// Persistence.
    Load,
}

impl PipelinePhase {
    /// The phase that follows, or `None` after Load.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Extract => Some(Self::Cognify),
            Self::Cognify => Some(Self::Load),
            Self::Load => None,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Cognify => "cognify",
            Self::Load => "load",
        }
    }
}

/// Result of one phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseOutcome<T> {
    /// Phase that produced this outcome.
    pub phase: PipelinePhase,
    /// Whether the phase completed.
    pub success: bool,
    /// Phase output. Empty when the phase failed.
    pub output: T,
    /// Failure description.
    pub error: Option<String>,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
}

impl<T: Default> PhaseOutcome<T> {
    #[allow(clippy::cast_precision_loss)]
    fn from_result(phase: PipelinePhase, result: crate::Result<T>, start: Instant) -> Self {
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        metrics::histogram!("ecl_phase_duration_ms", "phase" => phase.as_str())
            .record(duration_ms as f64);
        match result {
            Ok(output) => Self {
                phase,
                success: true,
                output,
                error: None,
                duration_ms,
            },
            Err(e) => {
                tracing::warn!(phase = phase.as_str(), error = %e, "pipeline phase failed");
                metrics::counter!("ecl_phase_failures_total", "phase" => phase.as_str())
                    .increment(1);
                Self {
                    phase,
                    success: false,
                    output: T::default(),
                    error: Some(e.to_string()),
                    duration_ms,
                }
            },
        }
    }
}

/// Outcomes of a full pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    /// Extract outcome.
    pub extract: PhaseOutcome<ExtractOutput>,
    /// Cognify outcome.
    pub cognify: PhaseOutcome<CognifyOutput>,
    /// Load outcome.
    pub load: PhaseOutcome<LoadOutput>,
}

impl PipelineReport {
    /// True when Extract found something and Load persisted it.
    #[must_use]
    pub fn success(&self) -> bool {
        self.extract.success && self.load.success
    }

    /// First phase error, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.extract
            .error
            .as_deref()
            .or(self.cognify.error.as_deref())
            .or(self.load.error.as_deref())
    }
}

/// Runs the three phases against a graph store and bridge.
#[derive(Debug, Clone)]
pub struct EclPipeline {
    config: PipelineConfig,
    store: Arc<KnowledgeGraphStore>,
    bridge: Arc<Bridge>,
}

impl EclPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub const fn new(
        config: PipelineConfig,
        store: Arc<KnowledgeGraphStore>,
        bridge: Arc<Bridge>,
    ) -> Self {
        Self {
            config,
            store,
            bridge,
        }
    }

    /// Pipeline settings.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs Extract, Cognify and Load over `content`.
    pub async fn run(&self, content: &str, source: &str) -> PipelineReport {
        let span = tracing::info_span!("ecl_pipeline", source, chars = content.len());
        async {
            let start = Instant::now();
            let extract = PhaseOutcome::from_result(
                PipelinePhase::Extract,
                extract(content, source, &self.config),
                start,
            );

            let start = Instant::now();
            let cognify = PhaseOutcome::from_result(
                PipelinePhase::Cognify,
                cognify(&extract.output.entities, content, &self.config),
                start,
            );

            let start = Instant::now();
            let loaded = load(
                &self.store,
                &self.bridge,
                &extract.output.entities,
                &cognify.output.relationships,
                source,
                self.config.push_to_knowledge_graph,
            )
            .await;
            let load = PhaseOutcome::from_result(PipelinePhase::Load, loaded, start);

            tracing::debug!(
                entities = extract.output.entities.len(),
                relationships = cognify.output.relationships.len(),
                loaded = load.output.entities_loaded,
                "pipeline finished"
            );
            PipelineReport {
                extract,
                cognify,
                load,
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;

    fn pipeline() -> EclPipeline {
        EclPipeline::new(
            PipelineConfig::default(),
            Arc::new(KnowledgeGraphStore::in_memory().unwrap()),
            Arc::new(Bridge::disconnected(BridgeConfig::default())),
        )
    }

    #[test]
    fn test_phases_are_linear() {
        assert_eq!(PipelinePhase::Extract.next(), Some(PipelinePhase::Cognify));
        assert_eq!(PipelinePhase::Cognify.next(), Some(PipelinePhase::Load));
        assert_eq!(PipelinePhase::Load.next(), None);
    }

    #[tokio::test]
    async fn test_full_run_persists_graph() {
        let pipeline = pipeline();
        let content = "class SessionStore defines refresh_session.\n\
                       def refresh_session(token): return validate_token(token)";
        let report = pipeline.run(content, "doc-1").await;

        assert!(report.success());
        assert!(!report.extract.output.entities.is_empty());
        assert!(!report.cognify.output.relationships.is_empty());
        assert_eq!(
            report.load.output.entities_loaded,
            report.extract.output.entities.len()
        );
        assert_eq!(
            pipeline.store.stats().unwrap().entity_count,
            report.extract.output.entities.len()
        );
        assert!(report.cognify.output.relationships.iter().all(|r| {
            r.strength >= pipeline.config().relationship_threshold
        }));
    }

    #[tokio::test]
    async fn test_failed_extract_still_loads() {
        let report = pipeline().run("   ", "empty").await;
        assert!(!report.extract.success);
        assert!(report.cognify.success);
        assert!(report.load.success);
        assert_eq!(report.load.output.entities_loaded, 0);
        assert!(report.first_error().is_some());
        assert!(!report.success());
    }
}
