//! Names of the remote components and methods the engine calls.

/// Embedding model.
pub const EMBEDDING: &str = "embedding";
/// `embedding.embed(text) -> {"embedding": [f32]}`.
pub const EMBED: &str = "embed";
/// `embedding.embed_batch([text]) -> {"embeddings": [[f32]]}`.
pub const EMBED_BATCH: &str = "embed_batch";

/// Summarization model.
pub const SUMMARIZER: &str = "summarizer";
/// `summarizer.contextualize(chunk, document, max_terms) -> {"context": str}`.
pub const CONTEXTUALIZE: &str = "contextualize";
/// `summarizer.summarize_code(code, language) -> {"summary": str}`.
pub const SUMMARIZE_CODE: &str = "summarize_code";

/// Cross-encoder relevance model.
pub const CROSS_ENCODER: &str = "cross_encoder";
/// `cross_encoder.score(query, [text], exact_match_boost) -> {"scores": [f32]}`.
pub const SCORE: &str = "score";

/// Syntax-tree parser.
pub const AST_PARSER: &str = "ast_parser";
/// `ast_parser.extract_entities(code, language) -> {"entities": [...]}`.
pub const EXTRACT_ENTITIES: &str = "extract_entities";

/// External knowledge graph.
pub const KNOWLEDGE_GRAPH: &str = "knowledge_graph";
/// `knowledge_graph.store({entities, relationships}) -> {"stored": bool}`.
pub const STORE: &str = "store";
