//! Agentic code analysis: block extraction, pattern matching and summaries.

use super::{StrategyDeps, StrategyExecutor};
use crate::bridge::{Bridge, components};
use crate::config::AgenticConfig;
use crate::models::{Context, Query, StrategyKind};
use crate::rules::{CodeMetrics, code_pattern_rules, detect_language, is_definition_start};
use crate::storage::DocumentStore;
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

const STORED_SOURCE_LIMIT: usize = 5;

/// A candidate block of code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlock {
    /// 1-based first line.
    pub start_line: usize,
    /// 1-based last line.
    pub end_line: usize,
    /// Block text.
    pub text: String,
}

impl CodeBlock {
    fn chars(&self) -> usize {
        self.text.chars().count()
    }

    fn append(&mut self, other: Self) {
        self.text.push('\n');
        self.text.push_str(&other.text);
        self.end_line = other.end_line;
    }
}

/// Splits code into blocks of `min_chars..=max_chars` characters.
///
/// Segments start at unindented definition lines and at unindented lines that
/// follow a blank line or a closing brace. Short neighbouring segments are
/// merged; oversized segments are split at line boundaries.
#[must_use]
pub fn extract_code_blocks(code: &str, min_chars: usize, max_chars: usize) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut pending: Option<CodeBlock> = None;

    for segment in segments(code)
        .into_iter()
        .flat_map(|segment| split_oversized(segment, max_chars))
    {
        pending = Some(match pending.take() {
            None => segment,
            Some(block) if block.chars() >= min_chars => {
                blocks.push(block);
                segment
            },
            Some(mut block) if block.chars() + 1 + segment.chars() <= max_chars => {
                block.append(segment);
                block
            },
            Some(_) => segment,
        });
    }
    if let Some(block) = pending {
        blocks.push(block);
    }

    blocks.retain(|block| (min_chars..=max_chars).contains(&block.chars()));
    blocks
}

fn segments(code: &str) -> Vec<CodeBlock> {
    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut start_line = 1;
    let mut after_delimiter = false;

    for (index, line) in code.lines().enumerate() {
        let unindented = !line.trim().is_empty() && !line.starts_with(char::is_whitespace);
        let boundary = unindented && (is_definition_start(line) || after_delimiter);
        if boundary && !current.is_empty() {
            push_segment(&mut segments, &current, start_line);
            current.clear();
        }
        if current.is_empty() {
            start_line = index + 1;
        }
        current.push(line);
        after_delimiter = line.trim().is_empty() || line.starts_with('}');
    }
    push_segment(&mut segments, &current, start_line);
    segments
}

fn push_segment(segments: &mut Vec<CodeBlock>, lines: &[&str], start_line: usize) {
    let text = lines.join("\n");
    let text = text.trim_end();
    if text.trim().is_empty() {
        return;
    }
    segments.push(CodeBlock {
        start_line,
        end_line: start_line + text.lines().count().saturating_sub(1),
        text: text.to_string(),
    });
}

fn split_oversized(block: CodeBlock, max_chars: usize) -> Vec<CodeBlock> {
    if block.chars() <= max_chars {
        return vec![block];
    }
    let mut pieces = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_chars = 0;
    let mut start_line = block.start_line;

    for (offset, line) in block.text.lines().enumerate() {
        let line_chars = line.chars().count();
        if !current.is_empty() && current_chars + 1 + line_chars > max_chars {
            push_segment(&mut pieces, &current, start_line);
            current.clear();
            current_chars = 0;
        }
        if current.is_empty() {
            start_line = block.start_line + offset;
        } else {
            current_chars += 1;
        }
        current.push(line);
        current_chars += line_chars;
    }
    push_segment(&mut pieces, &current, start_line);
    pieces
}

/// Finds code blocks in the context (or in stored code memories) and analyses
/// each: language, metrics, pattern matches above the threshold, AST
/// entities and a summary.
pub struct AgenticAnalysisStrategy {
    config: AgenticConfig,
    documents: Arc<DocumentStore>,
    bridge: Arc<Bridge>,
}

impl AgenticAnalysisStrategy {
    /// Creates the executor.
    #[must_use]
    pub fn new(deps: &StrategyDeps) -> Self {
        Self {
            config: deps.config.agentic.clone(),
            documents: Arc::clone(&deps.documents),
            bridge: Arc::clone(&deps.bridge),
        }
    }

    fn sources(&self, query: &Query, context: &Context) -> Result<Vec<(String, String)>> {
        let mut sources = Vec::new();
        if let Some(code) = context.code() {
            sources.push(("context.code".to_string(), code.to_string()));
        }
        if let Some(document) = context.document() {
            sources.push(("context.document".to_string(), document.to_string()));
        }
        if detect_language(query.text()).is_some() {
            sources.push(("query".to_string(), query.text().to_string()));
        }
        if sources.is_empty() {
            let text = query.canonical_text();
            for hit in self.documents.keyword_search(&text, STORED_SOURCE_LIMIT)? {
                if detect_language(&hit.content).is_some() {
                    sources.push((hit.id, hit.content));
                }
            }
        }
        Ok(sources)
    }

    fn matched_patterns(&self, code: &str, metrics: &CodeMetrics) -> Vec<Value> {
        let mut matches: Vec<(f32, Value)> = code_pattern_rules()
            .iter()
            .filter_map(|rule| {
                let confidence = rule.confidence(code, metrics);
                (confidence > 0.0 && confidence >= self.config.pattern_threshold).then(|| {
                    (
                        confidence,
                        json!({
                            "name": rule.name,
                            "family": rule.family.as_str(),
                            "confidence": confidence,
                        }),
                    )
                })
            })
            .collect();
        matches.sort_by(|a, b| b.0.total_cmp(&a.0));
        matches.into_iter().map(|(_, value)| value).collect()
    }

    /// Calls a code component, returning `field` of its reply or null.
    async fn code_call(
        &self,
        component: &str,
        method: &str,
        code: &str,
        language: Option<&str>,
        field: &str,
    ) -> Value {
        match self
            .bridge
            .invoke(component, method, vec![json!(code), json!(language)])
            .await
        {
            Ok(reply) => reply.result.get(field).cloned().unwrap_or(Value::Null),
            Err(e) => {
                tracing::warn!(component, method, error = %e, "code component unavailable");
                Value::Null
            },
        }
    }

    async fn analyze_block(&self, source: &str, block: &CodeBlock) -> Value {
        let detected = detect_language(&block.text);
        let language = detected.map(|(name, _)| name);
        let metrics = CodeMetrics::measure(&block.text);
        let patterns = self.matched_patterns(&block.text, &metrics);

        let entities = self
            .code_call(
                components::AST_PARSER,
                components::EXTRACT_ENTITIES,
                &block.text,
                language,
                "entities",
            )
            .await;
        let summary = self
            .code_call(
                components::SUMMARIZER,
                components::SUMMARIZE_CODE,
                &block.text,
                language,
                "summary",
            )
            .await;

        json!({
            "source": source,
            "start_line": block.start_line,
            "end_line": block.end_line,
            "chars": block.chars(),
            "language": language,
            "language_confidence": detected.map(|(_, confidence)| confidence),
            "complexity": metrics.complexity().as_str(),
            "metrics": metrics,
            "patterns": patterns,
            "entities": entities,
            "summary": summary,
        })
    }
}

#[async_trait]
impl StrategyExecutor for AgenticAnalysisStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::AgenticAnalysis
    }

    async fn execute(&self, query: &Query, context: &Context) -> Result<Value> {
        let sources = self.sources(query, context)?;

        let mut analyses = Vec::new();
        let mut truncated = false;
        'sources: for (source, code) in &sources {
            for block in
                extract_code_blocks(code, self.config.min_block_chars, self.config.max_block_chars)
            {
                if analyses.len() >= self.config.max_blocks {
                    truncated = true;
                    break 'sources;
                }
                analyses.push(self.analyze_block(source, &block).await);
            }
        }
        tracing::debug!(
            sources = sources.len(),
            blocks = analyses.len(),
            truncated,
            "code analysis finished"
        );

        let labels: Vec<&str> = sources.iter().map(|(label, _)| label.as_str()).collect();
        Ok(json!({
            "results": analyses,
            "sources": labels,
            "truncated": truncated,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::test_support;

    const CONFIG_CLASS: &str = r#"class Config:
    """Process-wide settings loaded once from disk."""
    _instance = None

    @classmethod
    def get_instance(cls):
        if cls._instance is None:
            cls._instance = Config()
        return cls._instance

    def load(self, path):
        with open(path) as handle:
            self.values = parse_settings(handle.read())
        return self.values
"#;

    fn function(name: &str) -> String {
        format!(
            "def {name}(request):\n    payload = request.json()\n    if not payload:\n        raise ValueError(\"empty payload\")\n    return handle(payload)\n"
        )
    }

    #[test]
    fn test_small_segments_merge_into_one_block() {
        let code = format!("{}\n{}\n{}", function("alpha"), function("beta"), function("gamma"));
        let blocks = extract_code_blocks(&code, 300, 5_000);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].start_line, 1);
        assert!(blocks[0].text.contains("def gamma"));
    }

    #[test]
    fn test_short_code_yields_nothing() {
        assert!(extract_code_blocks("x = 1\n", 300, 5_000).is_empty());
    }

    #[test]
    fn test_blocks_respect_bounds() {
        let code = (0..40)
            .map(|i| function(&format!("handler_{i}")))
            .collect::<Vec<_>>()
            .join("\n");
        let blocks = extract_code_blocks(&code, 300, 800);
        assert!(blocks.len() > 1);
        for block in &blocks {
            let chars = block.text.chars().count();
            assert!((300..=800).contains(&chars), "block of {chars} chars");
            assert!(block.start_line <= block.end_line);
        }
    }

    #[test]
    fn test_oversized_segment_is_split() {
        let body: String = (0..60).map(|i| format!("    step_{i} = compute({i})\n")).collect();
        let code = format!("def pipeline():\n{body}");
        let blocks = extract_code_blocks(&code, 300, 600);
        assert!(blocks.len() >= 2);
        assert!(blocks.iter().all(|b| b.text.chars().count() <= 600));
    }

    #[tokio::test]
    async fn test_singleton_reported_from_context_code() {
        let deps = test_support::deps();
        let context = Context::new().with_field(Context::CODE_FIELD, CONFIG_CLASS);

        let result = AgenticAnalysisStrategy::new(&deps)
            .run(&Query::from("what pattern is this config class"), &context)
            .await;
        assert!(result.success, "{:?}", result.error);
        let data = result.data.unwrap();
        let block = &data["results"][0];
        assert_eq!(block["language"], "python");
        let patterns: Vec<&str> = block["patterns"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|p| p["name"].as_str())
            .collect();
        assert!(patterns.contains(&"singleton"));
        assert!(block["summary"].as_str().unwrap().contains("python"));
        assert!(block["entities"].is_array());
    }

    #[tokio::test]
    async fn test_no_code_is_empty_success() {
        let result = AgenticAnalysisStrategy::new(&test_support::deps())
            .run(&Query::from("explain the retry policy"), &Context::default())
            .await;
        assert!(result.success);
        assert_eq!(result.item_count(), 0);
    }
}
