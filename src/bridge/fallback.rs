//! Fallback stages.
//!
//! When a call cannot be answered remotely the bridge walks an ordered list of
//! stages. Each stage is a function of the request and the error that
//! triggered the fallback; the first `Some` wins.
//!
//! The standard chain is:
//!
//! 1. `stale_response` - the last successful remote answer for the same call,
//!    even if its TTL has passed.
//! 2. `component_local` - a deterministic local approximation of the component.

use super::components::{
    AST_PARSER, CONTEXTUALIZE, CROSS_ENCODER, EMBED, EMBED_BATCH, EMBEDDING, EXTRACT_ENTITIES,
    KNOWLEDGE_GRAPH, SCORE, STORE, SUMMARIZE_CODE, SUMMARIZER,
};
use super::response_cache::ResponseCache;
use super::{BridgeError, BridgeRequest};
use crate::embedding::PseudoEmbedder;
use crate::embedding::embedding_payload;
use crate::models::EntityType;
use crate::rules::{CodeMetrics, detect_language, entity_rules};
use crate::scoring::{fallback_relevance, significant_terms, tokenize};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;

/// A fallback stage.
pub type FallbackStage = Box<dyn Fn(&BridgeRequest, &BridgeError) -> Option<Value> + Send + Sync>;

const DEFAULT_SHARED_TERMS: usize = 8;
const DEFAULT_EXACT_MATCH_BOOST: f32 = 0.2;

/// Ordered fallback stages.
pub struct FallbackChain {
    stages: Vec<(&'static str, FallbackStage)>,
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(|(name, _)| *name).collect();
        f.debug_struct("FallbackChain")
            .field("stages", &names)
            .finish()
    }
}

impl FallbackChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, name: &'static str, stage: FallbackStage) -> Self {
        self.stages.push((name, stage));
        self
    }

    /// Stale response, then component-local.
    #[must_use]
    pub fn standard(cache: Arc<ResponseCache>) -> Self {
        Self::new()
            .with_stage("stale_response", stale_response_stage(cache))
            .with_stage("component_local", Box::new(component_local))
    }

    /// Returns the first stage answer and the stage name.
    #[must_use]
    pub fn resolve(&self, request: &BridgeRequest, error: &BridgeError) -> Option<(&'static str, Value)> {
        self.stages
            .iter()
            .find_map(|(name, stage)| stage(request, error).map(|value| (*name, value)))
    }

    /// Stage names in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|(name, _)| *name).collect()
    }
}

impl Default for FallbackChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves the last successful remote answer for an identical call.
#[must_use]
pub fn stale_response_stage(cache: Arc<ResponseCache>) -> FallbackStage {
    Box::new(move |request: &BridgeRequest, _error: &BridgeError| {
        if !ResponseCache::is_cacheable(&request.method) {
            return None;
        }
        let key = ResponseCache::key(&request.component, &request.method, &request.args);
        cache.get_stale(&key)
    })
}

/// Local approximation for every known component method.
#[must_use]
pub fn component_local(request: &BridgeRequest, _error: &BridgeError) -> Option<Value> {
    match (request.component.as_str(), request.method.as_str()) {
        (EMBEDDING, EMBED) => {
            let text = request.arg_str(0)?;
            Some(embedding_payload(&PseudoEmbedder::new().vector(text), "pseudo"))
        },
        (EMBEDDING, EMBED_BATCH) => {
            let texts = request.args.first()?.as_array()?;
            let embedder = PseudoEmbedder::new();
            let embeddings: Vec<Vec<f32>> = texts
                .iter()
                .map(|t| embedder.vector(t.as_str().unwrap_or_default()))
                .collect();
            Some(json!({ "embeddings": embeddings, "model": "pseudo" }))
        },
        (SUMMARIZER, CONTEXTUALIZE) => {
            let chunk = request.arg_str(0)?;
            let document = request.arg_str(1).unwrap_or(chunk);
            let max_terms = request
                .args
                .get(2)
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(DEFAULT_SHARED_TERMS);
            Some(extractive_context(chunk, document, max_terms))
        },
        (SUMMARIZER, SUMMARIZE_CODE) => {
            let code = request.arg_str(0)?;
            Some(template_summary(code, request.arg_str(1)))
        },
        (CROSS_ENCODER, SCORE) => {
            let query = request.arg_str(0)?;
            let texts = request.args.get(1)?.as_array()?;
            #[allow(clippy::cast_possible_truncation)]
            let boost = request
                .args
                .get(2)
                .and_then(Value::as_f64)
                .map_or(DEFAULT_EXACT_MATCH_BOOST, |b| b as f32);
            let scores: Vec<f32> = texts
                .iter()
                .map(|t| fallback_relevance(query, t.as_str().unwrap_or_default(), boost))
                .collect();
            Some(json!({ "scores": scores, "method": "jaccard" }))
        },
        (AST_PARSER, EXTRACT_ENTITIES) => {
            let code = request.arg_str(0)?;
            Some(json!({ "entities": definitions(code), "method": "rules" }))
        },
        (KNOWLEDGE_GRAPH, STORE) => Some(json!({ "stored": false, "deferred": true })),
        _ => None,
    }
}

/// Lists high-frequency document terms that also occur in the chunk.
fn extractive_context(chunk: &str, document: &str, max_terms: usize) -> Value {
    let chunk_tokens: HashSet<String> = tokenize(chunk).into_iter().collect();
    let terms: Vec<String> = significant_terms(document)
        .into_iter()
        .filter(|(term, _)| chunk_tokens.contains(term))
        .take(max_terms)
        .map(|(term, _)| term)
        .collect();
    let context = if terms.is_empty() {
        String::new()
    } else {
        format!("This passage covers {}.", terms.join(", "))
    };
    json!({ "context": context, "terms": terms, "method": "extractive" })
}

fn template_summary(code: &str, language: Option<&str>) -> Value {
    let metrics = CodeMetrics::measure(code);
    let language = language
        .map(str::to_string)
        .or_else(|| detect_language(code).map(|(name, _)| name.to_string()))
        .unwrap_or_else(|| "unknown".to_string());
    let names: Vec<String> = definitions(code)
        .into_iter()
        .filter_map(|d| d.get("name").and_then(Value::as_str).map(str::to_string))
        .collect();
    let defines = if names.is_empty() {
        String::new()
    } else {
        format!(" defining {}", names.join(", "))
    };
    let summary = format!(
        "{language} block of {} lines with {} functions and {} branches{defines} ({} complexity).",
        metrics.lines,
        metrics.functions,
        metrics.branches,
        metrics.complexity().as_str(),
    );
    json!({ "summary": summary, "method": "template" })
}

/// Function and class definitions with 1-based line numbers.
fn definitions(code: &str) -> Vec<Value> {
    let mut found = Vec::new();
    for rule in entity_rules() {
        if !matches!(rule.name, "function_definition" | "class") {
            continue;
        }
        let Some(regex) = rule.pattern.as_ref() else {
            continue;
        };
        for caps in regex.captures_iter(code) {
            let Some(name) = caps.get(1) else { continue };
            let line = code[..name.start()].matches('\n').count() + 1;
            let kind = if rule.entity_type == EntityType::Class {
                "class"
            } else {
                "function"
            };
            found.push(json!({ "name": name.as_str(), "type": kind, "line": line }));
        }
    }
    found.sort_by_key(|v| v.get("line").and_then(Value::as_u64).unwrap_or(0));
    found
}
