//! Core trait definitions for text oracles.
//!
//! The `Oracle` trait is implemented by the HTTP backends in
//! `examlens-providers` and by [`crate::mock::MockOracle`] for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Oracle trait
// ---------------------------------------------------------------------------

/// A text-in, text-out generative backend.
///
/// Nothing is assumed about the format of the returned text. Structured
/// output is obtained through [`crate::extraction::Extractor`].
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Human-readable backend name (e.g. "openai").
    fn name(&self) -> &str;

    /// Send one prompt and return the raw reply.
    async fn call(&self, request: &OracleRequest) -> anyhow::Result<OracleResponse>;

    /// List known models for this backend.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// One prompt sent to an oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRequest {
    /// Model identifier (e.g. "deepseek-chat").
    pub model: String,
    /// The user prompt.
    pub prompt: String,
    /// Optional system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Raw reply from an oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleResponse {
    /// The reply text, unprocessed.
    pub content: String,
    /// Model that actually answered.
    pub model: String,
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting reported by the backend, when available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
}

// ---------------------------------------------------------------------------
// Default system prompt
// ---------------------------------------------------------------------------

/// System prompt used when a caller does not supply one.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "你是一个专业的教育数据分析专家，能够从学生的答题卡中提取知识点并生成学习建议。请只输出所要求的内容。";

// ---------------------------------------------------------------------------
// JSON extraction from markdown
// ---------------------------------------------------------------------------

/// Pull the JSON payload out of a free-form oracle reply.
///
/// Handles:
/// - ```json``` fenced blocks (first one wins)
/// - Generic ``` blocks (if no json-specific block found)
/// - Prose around a bare object (outermost `{` .. `}` span)
/// - Anything else is returned trimmed, as-is
pub fn extract_json_from_markdown(response: &str) -> String {
    let mut json_block: Option<String> = None;
    let mut generic_block: Option<String> = None;
    let mut in_block = false;
    let mut is_json_block = false;
    let mut is_generic_block = false;
    let mut current_block = String::new();

    for line in response.lines() {
        let trimmed = line.trim();

        if !in_block && trimmed.starts_with("```") {
            in_block = true;
            let lang = trimmed.trim_start_matches('`').trim().to_lowercase();
            is_json_block = lang == "json";
            is_generic_block = lang.is_empty();
            current_block.clear();
            continue;
        }

        if in_block && trimmed == "```" {
            in_block = false;
            if is_json_block && json_block.is_none() {
                json_block = Some(current_block.clone());
            } else if is_generic_block && generic_block.is_none() {
                generic_block = Some(current_block.clone());
            }
            current_block.clear();
            continue;
        }

        if in_block {
            if !current_block.is_empty() {
                current_block.push('\n');
            }
            current_block.push_str(line);
        }
    }

    // Unclosed fence from a truncated reply
    if in_block && !current_block.is_empty() {
        if is_json_block && json_block.is_none() {
            json_block = Some(current_block);
        } else if is_generic_block && generic_block.is_none() {
            generic_block = Some(current_block);
        }
    }

    if let Some(block) = json_block.or(generic_block) {
        return block.trim().to_string();
    }

    let trimmed = response.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => trimmed[start..=end].to_string(),
        _ => trimmed.to_string(),
    }
}
