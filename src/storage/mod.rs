//! Persistence layer.
//!
//! | Store | Backing | Used by |
//! |-------|---------|---------|
//! | [`DocumentStore`] | `SQLite` + FTS5, embeddings as BLOBs | hybrid search, recall, ingestion |
//! | [`KnowledgeGraphStore`] | `SQLite` | ECL Load phase |
//! | [`CorrectionsLog`] | plain text file | memory recall |
//! | [`PreferenceRecord`] | host-supplied records | memory recall |
//!
//! Both `SQLite` stores share one connection setup (WAL, `busy_timeout`) and
//! guard their connection with a mutex.

mod collaborators;
mod connection;
mod documents;
mod graph;

pub use collaborators::{CorrectionMatch, CorrectionsLog, PreferenceRecord, matching_preferences};
pub use documents::DocumentStore;
pub use graph::{GraphStats, KnowledgeGraphStore, LoadCounts};
