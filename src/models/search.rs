//! Search documents, hits and fused hits with provenance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stored document (memory) that search strategies retrieve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier.
    pub id: String,
    /// Original content. Never truncated by enrichment.
    pub content: String,
    /// Provenance label.
    #[serde(default)]
    pub source: Option<String>,
    /// Detected or declared language, for code documents.
    #[serde(default)]
    pub language: Option<String>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    /// Creates a document with a generated id.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            content: content.into(),
            source: None,
            language: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Sets the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A single hit from one retrieval source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Document id.
    pub id: String,
    /// Document content.
    pub content: String,
    /// Source-specific score (cosine similarity or normalized BM25).
    pub score: f32,
    /// Document provenance label.
    #[serde(default)]
    pub source: Option<String>,
}

impl SearchHit {
    /// Creates a hit.
    #[must_use]
    pub fn new(id: impl Into<String>, content: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            score,
            source: None,
        }
    }
}

/// Which ranked list contributed to a fused score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankSource {
    /// Vector (semantic) search.
    Vector,
    /// Keyword (BM25) search.
    Keyword,
}

impl RankSource {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Keyword => "keyword",
        }
    }
}

/// One source's contribution to a fused hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankProvenance {
    /// Contributing list.
    pub source: RankSource,
    /// 1-based rank in that list.
    pub rank: usize,
    /// Score the source assigned.
    pub raw_score: f32,
    /// Weighted RRF contribution.
    pub contribution: f32,
}

/// A hit after reciprocal rank fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedHit {
    /// Underlying hit (first seen).
    pub hit: SearchHit,
    /// Combined weighted RRF score.
    pub score: f32,
    /// True when both sources ranked this document.
    pub boosted: bool,
    /// Every contribution, for auditability.
    pub provenance: Vec<RankProvenance>,
}

impl FusedHit {
    /// Returns the contribution from one source, if it ranked this hit.
    #[must_use]
    pub fn contribution(&self, source: RankSource) -> Option<f32> {
        self.provenance
            .iter()
            .find(|p| p.source == source)
            .map(|p| p.contribution)
    }
}

/// A candidate after reranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedHit {
    /// Underlying hit.
    pub hit: SearchHit,
    /// Score before reranking.
    pub original_score: f32,
    /// Cross-encoder (or fallback) relevance.
    pub cross_encoder_score: f32,
    /// Blended score.
    pub score: f32,
}
