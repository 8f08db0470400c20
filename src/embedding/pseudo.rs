//! Deterministic hash-based embeddings.

use super::{DEFAULT_DIMENSIONS, Embedder};
use crate::{Error, Result};
use sha2::{Digest, Sha256};

/// Limits per-text work on very long inputs.
const MAX_WORDS: usize = 1000;

/// Hash-based pseudo-embedder.
///
/// Produces a normalized vector from word hashes. Identical texts always map
/// to identical vectors and texts sharing words land closer together, but this
/// is not a semantic model.
#[derive(Debug, Clone, Copy)]
pub struct PseudoEmbedder {
    dimensions: usize,
}

impl PseudoEmbedder {
    /// Creates an embedder with [`DEFAULT_DIMENSIONS`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
        }
    }

    /// Creates an embedder with custom dimensions (at least 1).
    #[must_use]
    pub const fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: if dimensions == 0 { 1 } else { dimensions },
        }
    }

    /// Embeds text. Empty text yields a zero vector.
    #[must_use]
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        for (i, word) in text.split_whitespace().take(MAX_WORDS).enumerate() {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest[..8]);
            distribute_hash(&mut embedding, u64::from_le_bytes(bytes), i);
        }

        normalize(&mut embedding);
        embedding
    }
}

impl Default for PseudoEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for PseudoEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("cannot embed empty text".to_string()));
        }
        Ok(self.vector(text))
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn distribute_hash(embedding: &mut [f32], hash: u64, word_idx: usize) {
    let dimensions = embedding.len();
    for j in 0..8 {
        let idx = ((hash >> (j * 8)) as usize + word_idx) % dimensions;
        let value = ((hash >> (j * 4)) & 0xFF) as f32 / 255.0 - 0.5;
        embedding[idx] += value;
    }
}

fn normalize(embedding: &mut [f32]) {
    let norm_sq: f32 = embedding.iter().map(|x| x * x).sum();
    if norm_sq <= 0.0 {
        return;
    }
    let inv_norm = norm_sq.sqrt().recip();
    for v in embedding.iter_mut() {
        *v *= inv_norm;
    }
}
