//! `SQLite` knowledge graph store.
//!
//! Receives the Load phase output. Entities are keyed by their deterministic
//! id, so reloading the same entity keeps the higher confidence instead of
//! duplicating the node. Each row records where it came from and when it was
//! loaded.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use super::connection::{db_error, open, record_operation};
use crate::models::{Entity, Relationship};
use crate::{Error, Result, acquire_lock, current_timestamp};
use rusqlite::{Connection, params};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

const STORE: &str = "graph";

/// Counts reported by a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadCounts {
    /// Entities written.
    pub entities: usize,
    /// Relationships written.
    pub relationships: usize,
    /// Relationships skipped because an endpoint was not in the batch or store.
    pub skipped_relationships: usize,
}

/// Graph statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    /// Stored entities.
    pub entity_count: usize,
    /// Stored relationships.
    pub relationship_count: usize,
    /// Entity count per type name.
    pub entities_by_type: BTreeMap<String, usize>,
}

/// Knowledge graph store.
pub struct KnowledgeGraphStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl std::fmt::Debug for KnowledgeGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeGraphStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl KnowledgeGraphStore {
    /// Opens (or creates) a store at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open(Some(&db_path), STORE)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(open(None, STORE)?),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS graph_entities (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                origin TEXT NOT NULL,
                payload TEXT NOT NULL,
                loaded_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_graph_entities_type ON graph_entities(entity_type);
            CREATE TABLE IF NOT EXISTS graph_relationships (
                id TEXT PRIMARY KEY,
                source_entity_id TEXT NOT NULL REFERENCES graph_entities(id),
                target_entity_id TEXT NOT NULL REFERENCES graph_entities(id),
                relationship_type TEXT NOT NULL,
                strength REAL NOT NULL,
                origin TEXT NOT NULL,
                payload TEXT NOT NULL,
                loaded_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_graph_rel_source ON graph_relationships(source_entity_id);
            CREATE INDEX IF NOT EXISTS idx_graph_rel_target ON graph_relationships(target_entity_id);",
        )
        .map_err(db_error("create_graph_tables"))
    }

    /// Persists entities then relationships in one transaction.
    ///
    /// `origin` is recorded on every row. Relationships whose endpoints are
    /// neither in `entities` nor already stored are skipped and counted.
    ///
    /// # Errors
    ///
    /// Returns an error if a write fails; nothing from the batch is kept.
    #[instrument(
        skip(self, entities, relationships),
        fields(store = STORE, entities = entities.len(), relationships = relationships.len())
    )]
    pub fn store(
        &self,
        entities: &[Entity],
        relationships: &[Relationship],
        origin: &str,
    ) -> Result<LoadCounts> {
        let start = Instant::now();
        let result = (|| {
            let mut conn = acquire_lock(&self.conn);
            let tx = conn.transaction().map_err(db_error("begin_graph_load"))?;
            let loaded_at = current_timestamp() as i64;
            let mut counts = LoadCounts::default();

            for entity in entities {
                tx.execute(
                    "INSERT INTO graph_entities
                        (id, name, entity_type, confidence, origin, payload, loaded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                        confidence = MAX(graph_entities.confidence, excluded.confidence),
                        payload = CASE WHEN excluded.confidence > graph_entities.confidence
                                  THEN excluded.payload ELSE graph_entities.payload END,
                        origin = excluded.origin,
                        loaded_at = excluded.loaded_at",
                    params![
                        entity.id,
                        entity.name,
                        entity.entity_type.as_str(),
                        f64::from(entity.confidence),
                        origin,
                        to_payload(entity)?,
                        loaded_at,
                    ],
                )
                .map_err(db_error("insert_entity"))?;
                counts.entities += 1;
            }

            for relationship in relationships {
                let endpoints: i64 = tx
                    .query_row(
                        "SELECT COUNT(*) FROM graph_entities WHERE id IN (?1, ?2)",
                        params![relationship.source_entity_id, relationship.target_entity_id],
                        |row| row.get(0),
                    )
                    .map_err(db_error("check_relationship_endpoints"))?;
                let expected = if relationship.source_entity_id == relationship.target_entity_id {
                    1
                } else {
                    2
                };
                if endpoints < expected {
                    counts.skipped_relationships += 1;
                    continue;
                }

                tx.execute(
                    "INSERT OR REPLACE INTO graph_relationships
                        (id, source_entity_id, target_entity_id, relationship_type,
                         strength, origin, payload, loaded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        relationship.id,
                        relationship.source_entity_id,
                        relationship.target_entity_id,
                        relationship.relationship_type.as_str(),
                        f64::from(relationship.strength),
                        origin,
                        to_payload(relationship)?,
                        loaded_at,
                    ],
                )
                .map_err(db_error("insert_relationship"))?;
                counts.relationships += 1;
            }

            tx.commit().map_err(db_error("commit_graph_load"))?;
            Ok(counts)
        })();
        record_operation(STORE, "load", start, result.is_ok());
        if let Ok(counts) = &result {
            if counts.skipped_relationships > 0 {
                tracing::warn!(
                    skipped = counts.skipped_relationships,
                    "relationships referenced unknown entities"
                );
            }
        }
        result
    }

    /// Stored entities, highest confidence first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a payload is unreadable.
    pub fn entities(&self, limit: usize) -> Result<Vec<Entity>> {
        self.payloads(
            "SELECT payload FROM graph_entities ORDER BY confidence DESC, id LIMIT ?1",
            params![limit as i64],
            "list_entities",
        )
    }

    /// Relationships touching an entity, strongest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a payload is unreadable.
    pub fn relationships_for(&self, entity_id: &str) -> Result<Vec<Relationship>> {
        self.payloads(
            "SELECT payload FROM graph_relationships
             WHERE source_entity_id = ?1 OR target_entity_id = ?1
             ORDER BY strength DESC, id",
            params![entity_id],
            "relationships_for",
        )
    }

    /// Stored relationships, strongest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a payload is unreadable.
    pub fn relationships(&self, limit: usize) -> Result<Vec<Relationship>> {
        self.payloads(
            "SELECT payload FROM graph_relationships ORDER BY strength DESC, id LIMIT ?1",
            params![limit as i64],
            "list_relationships",
        )
    }

    fn payloads<T: serde::de::DeserializeOwned>(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
        operation: &str,
    ) -> Result<Vec<T>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(sql).map_err(db_error(operation))?;
        let rows = stmt
            .query_map(params, |row| row.get::<_, String>(0))
            .map_err(db_error(operation))?;
        let mut out = Vec::new();
        for row in rows {
            let payload = row.map_err(db_error(operation))?;
            out.push(
                serde_json::from_str(&payload).map_err(|e| Error::OperationFailed {
                    operation: operation.to_string(),
                    cause: e.to_string(),
                })?,
            );
        }
        Ok(out)
    }

    /// Entity and relationship counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stats(&self) -> Result<GraphStats> {
        let conn = acquire_lock(&self.conn);
        let count = |sql: &str| {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
                .map_err(db_error("graph_stats"))
        };
        let entity_count = count("SELECT COUNT(*) FROM graph_entities")?;
        let relationship_count = count("SELECT COUNT(*) FROM graph_relationships")?;

        let mut stmt = conn
            .prepare("SELECT entity_type, COUNT(*) FROM graph_entities GROUP BY entity_type")
            .map_err(db_error("graph_stats"))?;
        let entities_by_type = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })
            .map_err(db_error("graph_stats"))?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()
            .map_err(db_error("graph_stats"))?;

        Ok(GraphStats {
            entity_count,
            relationship_count,
            entities_by_type,
        })
    }

    /// Deletes every entity and relationship.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute_batch("DELETE FROM graph_relationships; DELETE FROM graph_entities;")
            .map_err(db_error("clear_graph"))
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::OperationFailed {
        operation: "serialize_graph_payload".to_string(),
        cause: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityType, RelationshipType, Span};

    fn entity(name: &str, entity_type: EntityType, confidence: f32) -> Entity {
        Entity::new(name, entity_type, confidence, "test", Span::new(0, name.len()))
    }

    #[test]
    fn test_store_and_read_back() {
        let store = KnowledgeGraphStore::in_memory().unwrap();
        let file = entity("auth.py", EntityType::File, 0.9);
        let function = entity("login", EntityType::Function, 0.8);
        let rel = Relationship::new(&file, &function, RelationshipType::Contains, 0.7);

        let counts = store
            .store(&[file.clone(), function.clone()], &[rel.clone()], "doc-1")
            .unwrap();
        assert_eq!(counts.entities, 2);
        assert_eq!(counts.relationships, 1);

        let entities = store.entities(10).unwrap();
        assert_eq!(entities[0], file);
        assert_eq!(store.relationships_for(&function.id).unwrap(), vec![rel]);

        let stats = store.stats().unwrap();
        assert_eq!(stats.entity_count, 2);
        assert_eq!(stats.entities_by_type.get("file"), Some(&1));
    }

    #[test]
    fn test_reload_keeps_higher_confidence() {
        let store = KnowledgeGraphStore::in_memory().unwrap();
        store
            .store(&[entity("Redis", EntityType::Technology, 0.9)], &[], "a")
            .unwrap();
        store
            .store(&[entity("redis", EntityType::Technology, 0.6)], &[], "b")
            .unwrap();

        let entities = store.entities(10).unwrap();
        assert_eq!(entities.len(), 1);
        assert!((entities[0].confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_dangling_relationship_skipped() {
        let store = KnowledgeGraphStore::in_memory().unwrap();
        let a = entity("alpha_fn", EntityType::Function, 0.7);
        let b = entity("beta_fn", EntityType::Function, 0.7);
        let rel = Relationship::new(&a, &b, RelationshipType::Calls, 0.5);

        let counts = store.store(&[a], &[rel], "x").unwrap();
        assert_eq!(counts.relationships, 0);
        assert_eq!(counts.skipped_relationships, 1);
        assert_eq!(store.stats().unwrap().relationship_count, 0);
    }

    #[test]
    fn test_clear() {
        let store = KnowledgeGraphStore::in_memory().unwrap();
        store
            .store(&[entity("Docker", EntityType::Technology, 0.8)], &[], "x")
            .unwrap();
        store.clear().unwrap();
        assert_eq!(store.stats().unwrap(), GraphStats::default());
    }
}
