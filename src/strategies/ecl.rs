//! Extract–Cognify–Load as a consultation strategy.

use super::{StrategyDeps, StrategyExecutor, query_text};
use crate::models::{Context, Query, StrategyKind};
use crate::pipeline::EclPipeline;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

/// Runs the pipeline over attached code, the attached document, or the query
/// itself, in that order of preference.
pub struct EclPipelineStrategy {
    pipeline: EclPipeline,
}

impl EclPipelineStrategy {
    /// Creates the executor.
    #[must_use]
    pub fn new(deps: &StrategyDeps) -> Self {
        Self {
            pipeline: EclPipeline::new(
                deps.config.pipeline.clone(),
                Arc::clone(&deps.graph),
                Arc::clone(&deps.bridge),
            ),
        }
    }
}

#[async_trait]
impl StrategyExecutor for EclPipelineStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::EclPipeline
    }

    async fn execute(&self, query: &Query, context: &Context) -> Result<Value> {
        let content = match context.code().or_else(|| context.document()) {
            Some(content) => content.to_string(),
            None => query_text(query)?,
        };
        let report = self.pipeline.run(&content, context.source_label()).await;
        if !report.success() {
            return Err(Error::StrategyFailure {
                strategy: StrategyKind::EclPipeline.as_str().to_string(),
                cause: report.first_error().unwrap_or("pipeline failed").to_string(),
            });
        }

        Ok(json!({
            "results": report.extract.output.entities,
            "relationships": report.cognify.output.relationships,
            "phases": report,
        }))
    }
}
