//! Embedding generation.
//!
//! [`PseudoEmbedder`] is the deterministic local embedder used whenever the
//! remote embedding component is unreachable. [`BridgeEmbedder`] asks the
//! remote component first and falls back through the bridge.

mod bridge;
mod pseudo;

pub use bridge::BridgeEmbedder;
pub(crate) use bridge::embedding_payload;
pub use pseudo::PseudoEmbedder;

use crate::Result;

/// Default embedding dimensions (all-MiniLM-L6-v2 compatible).
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Trait for synchronous embedding generators.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}
