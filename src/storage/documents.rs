//! `SQLite` + FTS5 document store.
//!
//! Documents live in `documents`; their text is mirrored into the
//! `documents_fts` virtual table for BM25 keyword search. Embeddings are
//! stored as little-endian `f32` BLOBs and searched by brute-force cosine,
//! which is adequate for the corpus sizes a single host keeps.

// SQLite returns i64 counts; they are non-negative.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use super::connection::{db_error, open, record_operation};
use crate::models::{Document, SearchHit};
use crate::scoring::cosine_similarity;
use crate::{Result, acquire_lock, current_timestamp};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

const STORE: &str = "documents";

/// Document store backed by `SQLite`.
pub struct DocumentStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

struct DocumentRow {
    id: String,
    content: String,
    source: Option<String>,
    language: Option<String>,
    metadata: Option<String>,
}

impl DocumentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            content: row.get(1)?,
            source: row.get(2)?,
            language: row.get(3)?,
            metadata: row.get(4)?,
        })
    }

    fn into_document(self) -> Document {
        let metadata: BTreeMap<String, String> = self
            .metadata
            .as_deref()
            .and_then(|m| serde_json::from_str(m).ok())
            .unwrap_or_default();
        Document {
            id: self.id,
            content: self.content,
            source: self.source,
            language: self.language,
            metadata,
        }
    }
}

impl DocumentStore {
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
        let conn = open(None, STORE)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path, `None` for in-memory stores.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT,
                language TEXT,
                metadata TEXT,
                embedding BLOB,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at DESC);
            CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
                id UNINDEXED,
                content
            );",
        )
        .map_err(db_error("create_document_tables"))
    }

    /// Inserts or replaces a document and its optional embedding.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; the transaction is rolled back.
    #[instrument(skip(self, document, embedding), fields(store = STORE, document.id = %document.id))]
    pub fn upsert(&self, document: &Document, embedding: Option<&[f32]>) -> Result<()> {
        let start = Instant::now();
        let result = (|| {
            let mut conn = acquire_lock(&self.conn);
            let tx = conn.transaction().map_err(db_error("begin_upsert"))?;

            let metadata = serde_json::to_string(&document.metadata).unwrap_or_default();
            let blob = embedding.map(encode_embedding);
            tx.execute(
                "INSERT OR REPLACE INTO documents
                    (id, content, source, language, metadata, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    document.id,
                    document.content,
                    document.source,
                    document.language,
                    metadata,
                    blob,
                    current_timestamp() as i64,
                ],
            )
            .map_err(db_error("insert_document"))?;
            tx.execute("DELETE FROM documents_fts WHERE id = ?1", params![document.id])
                .map_err(db_error("delete_document_fts"))?;
            tx.execute(
                "INSERT INTO documents_fts (id, content) VALUES (?1, ?2)",
                params![document.id, document.content],
            )
            .map_err(db_error("insert_document_fts"))?;

            tx.commit().map_err(db_error("commit_upsert"))
        })();
        record_operation(STORE, "upsert", start, result.is_ok());
        result
    }

    /// Fetches a document by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: &str) -> Result<Option<Document>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT id, content, source, language, metadata FROM documents WHERE id = ?1",
            params![id],
            DocumentRow::from_row,
        )
        .optional()
        .map(|row| row.map(DocumentRow::into_document))
        .map_err(db_error("get_document"))
    }

    /// Removes a document. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    #[instrument(skip(self), fields(store = STORE))]
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(db_error("begin_remove"))?;
        let removed = tx
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .map_err(db_error("delete_document"))?;
        tx.execute("DELETE FROM documents_fts WHERE id = ?1", params![id])
            .map_err(db_error("delete_document_fts"))?;
        tx.commit().map_err(db_error("commit_remove"))?;
        Ok(removed > 0)
    }

    /// Number of stored documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
            .map_err(db_error("count_documents"))
    }

    /// Most recent documents first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, limit: usize) -> Result<Vec<Document>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT id, content, source, language, metadata FROM documents
                 ORDER BY created_at DESC, id LIMIT ?1",
            )
            .map_err(db_error("prepare_list_documents"))?;
        let rows = stmt
            .query_map(params![limit as i64], DocumentRow::from_row)
            .map_err(db_error("list_documents"))?;
        rows.map(|row| row.map(DocumentRow::into_document))
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_error("read_document_row"))
    }

    /// BM25 keyword search.
    ///
    /// Terms are OR-ed and quoted so FTS5 operators in the query are taken
    /// literally. Scores are mapped into `(0, 1)` with a sigmoid over the
    /// negated BM25 value, so higher is better.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[instrument(skip(self, query), fields(store = STORE, query_length = query.len()))]
    pub fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let Some(fts_query) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare(
                    "SELECT d.id, d.content, d.source, bm25(documents_fts) AS score
                     FROM documents_fts f
                     JOIN documents d ON d.id = f.id
                     WHERE documents_fts MATCH ?1
                     ORDER BY score, d.id
                     LIMIT ?2",
                )
                .map_err(db_error("prepare_keyword_search"))?;
            let rows = stmt
                .query_map(params![fts_query, limit as i64], |row| {
                    let score: f64 = row.get(3)?;
                    Ok(SearchHit {
                        id: row.get(0)?,
                        content: row.get(1)?,
                        source: row.get(2)?,
                        score: normalize_bm25(score),
                    })
                })
                .map_err(db_error("keyword_search"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_error("read_keyword_row"))
        })();
        record_operation(STORE, "keyword_search", start, result.is_ok());
        result
    }

    /// Cosine-similarity search over stored embeddings.
    ///
    /// Documents without an embedding, or with one of a different dimension,
    /// are skipped. Ties are broken by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[instrument(skip(self, embedding), fields(store = STORE, dimensions = embedding.len()))]
    pub fn vector_search(&self, embedding: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        if embedding.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare(
                    "SELECT id, content, source, embedding FROM documents
                     WHERE embedding IS NOT NULL",
                )
                .map_err(db_error("prepare_vector_search"))?;
            let rows = stmt
                .query_map([], |row| {
                    let blob: Vec<u8> = row.get(3)?;
                    Ok((
                        SearchHit {
                            id: row.get(0)?,
                            content: row.get(1)?,
                            source: row.get(2)?,
                            score: 0.0,
                        },
                        blob,
                    ))
                })
                .map_err(db_error("vector_search"))?;

            let mut hits = Vec::new();
            for row in rows {
                let (mut hit, blob) = row.map_err(db_error("read_vector_row"))?;
                let stored = decode_embedding(&blob);
                if stored.len() != embedding.len() {
                    continue;
                }
                hit.score = cosine_similarity(embedding, &stored);
                hits.push(hit);
            }
            hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
            hits.truncate(limit);
            Ok(hits)
        })();
        record_operation(STORE, "vector_search", start, result.is_ok());
        result
    }

    /// Deletes every document.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute_batch("DELETE FROM documents; DELETE FROM documents_fts;")
            .map_err(db_error("clear_documents"))
    }
}

/// Builds an FTS5 query of quoted, OR-ed terms. `None` when no term remains.
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| {
            term.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
                .collect::<String>()
        })
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{term}\""))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" OR "))
}

/// FTS5 `bm25()` is negative, more negative = better.
fn normalize_bm25(score: f64) -> f32 {
    let sigmoid = 1.0 / (1.0 + (0.5 * score).exp());
    sigmoid.clamp(0.0, 1.0) as f32
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
