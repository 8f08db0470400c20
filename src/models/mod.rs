//! Data models.
//!
//! Types shared by the router, strategies, pipeline and coordinator.

pub mod graph;
mod query;
mod result;
mod routing;
mod search;

pub use graph::{Entity, EntityType, Relationship, RelationshipType, Span};
pub use query::{Complexity, Context, Query, QueryAnalysis, QueryType, StructuredQuery};
pub use result::{AggregatedResult, FallbackTrace, StrategyResult};
pub use routing::{RoutingDecision, StrategyKind};
pub use search::{Document, FusedHit, RankProvenance, RankSource, RerankedHit, SearchHit};
