//! Load phase: persistence and the optional knowledge-graph push.

use crate::bridge::{Bridge, components};
use crate::models::{Entity, Relationship};
use crate::storage::KnowledgeGraphStore;
use crate::Result;
use serde::Serialize;
use serde_json::json;

/// Output of the Load phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadOutput {
    /// Entities written.
    pub entities_loaded: usize,
    /// Relationships written.
    pub relationships_loaded: usize,
    /// Relationships whose endpoints were not stored.
    pub skipped_relationships: usize,
    /// Whether the remote knowledge graph accepted the batch.
    pub pushed_to_graph: bool,
    /// Why the push did not happen, if it was attempted.
    pub push_error: Option<String>,
}

/// Persists entities and relationships with provenance, then optionally pushes
/// them to the remote knowledge graph.
///
/// The push is best-effort: a failed or deferred push is recorded in the
/// output and never turns the phase into a failure.
///
/// # Errors
///
/// Returns an error only if the local store rejects the batch.
pub async fn load(
    store: &KnowledgeGraphStore,
    bridge: &Bridge,
    entities: &[Entity],
    relationships: &[Relationship],
    provenance: &str,
    push: bool,
) -> Result<LoadOutput> {
    let counts = store.store(entities, relationships, provenance)?;
    let mut output = LoadOutput {
        entities_loaded: counts.entities,
        relationships_loaded: counts.relationships,
        skipped_relationships: counts.skipped_relationships,
        ..LoadOutput::default()
    };

    if !push || entities.is_empty() {
        return Ok(output);
    }

    let batch = json!({
        "entities": entities,
        "relationships": relationships,
        "provenance": provenance,
    });
    match bridge
        .invoke(components::KNOWLEDGE_GRAPH, components::STORE, vec![batch])
        .await
    {
        Ok(reply) if reply.is_degraded() => {
            output.push_error = Some(reply.degraded_by.map_or_else(
                || "knowledge graph push deferred".to_string(),
                |e| e.to_string(),
            ));
        },
        Ok(reply) => {
            output.pushed_to_graph = reply
                .result
                .get("stored")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            if !output.pushed_to_graph {
                output.push_error = Some("knowledge graph declined the batch".to_string());
            }
        },
        Err(e) => output.push_error = Some(e.to_string()),
    }

    if let Some(reason) = &output.push_error {
        tracing::debug!(reason = %reason, "knowledge graph push skipped");
    }
    Ok(output)
}
