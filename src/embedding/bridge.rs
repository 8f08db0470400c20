//! Embeddings through the remote embedding component.

use super::PseudoEmbedder;
use crate::bridge::{Bridge, components};
use crate::{Error, Result};
use serde_json::{Value, json};
use std::sync::Arc;

/// Embedder backed by the bridge.
///
/// The bridge answers with a local pseudo-embedding when the remote component
/// is unavailable, so callers always receive a vector of the same shape.
#[derive(Clone)]
pub struct BridgeEmbedder {
    bridge: Arc<Bridge>,
    local: PseudoEmbedder,
}

impl BridgeEmbedder {
    /// Creates a bridge-backed embedder.
    #[must_use]
    pub const fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            local: PseudoEmbedder::new(),
        }
    }

    /// Embeds one text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for empty text and
    /// [`Error::MalformedEnvelope`] when the reply carries no vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("cannot embed empty text".to_string()));
        }
        let reply = self
            .bridge
            .invoke(
                components::EMBEDDING,
                components::EMBED,
                vec![Value::String(text.to_string())],
            )
            .await?;
        parse_vector(&reply.result).ok_or_else(|| {
            Error::MalformedEnvelope("embedding reply has no numeric 'embedding' array".to_string())
        })
    }

    /// Embeds text locally without a bridge call.
    #[must_use]
    pub fn embed_local(&self, text: &str) -> Vec<f32> {
        self.local.vector(text)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn parse_vector(result: &Value) -> Option<Vec<f32>> {
    let values = result.get("embedding")?.as_array()?;
    values.iter().map(|v| v.as_f64().map(|f| f as f32)).collect()
}

/// Builds the canonical embedding reply payload.
#[must_use]
pub(crate) fn embedding_payload(vector: &[f32], model: &str) -> Value {
    json!({
        "embedding": vector,
        "dimensions": vector.len(),
        "model": model,
    })
}
