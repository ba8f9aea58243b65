//! Oracle call protocol: bounded retries with schema validation and a
//! deterministic fallback.
//!
//! Attempt 1 sends the caller's prompt verbatim. Every later attempt sends the
//! same escalation prompt, which restates the request and adds a JSON format
//! reminder generated from the [`Schema`]. A reply is accepted only when it
//! parses as a JSON object, carries every required field with the declared
//! kind, and passes the caller's optional `accept` step. After the last failed
//! attempt the caller's default is returned; errors never escape.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{ExtractionError, OracleError};
use crate::traits::{extract_json_from_markdown, Oracle, OracleRequest, DEFAULT_SYSTEM_PROMPT};

/// A JSON object returned by the oracle.
pub type Record = Map<String, Value>;

/// Notice prepended to the format reminder on retries.
pub const RETRY_NOTICE: &str = "上一次的响应格式不正确，无法解析为JSON。";

/// Closing instruction of the escalation prompt.
pub const RETRY_INSTRUCTION: &str = "请重新回答之前的问题。";

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Expected JSON type of a required field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    /// `true`/`false`, or the strings `"true"`/`"false"`.
    Bool,
    /// Any finite number, or a numeric string.
    Number,
    /// A whole number, or an integer string.
    Integer,
    Array,
    Object,
    /// A string or `null`.
    NullableString,
}

impl FieldKind {
    fn expected(self) -> &'static str {
        match self {
            FieldKind::String => "a string",
            FieldKind::Bool => "a boolean",
            FieldKind::Number => "a number",
            FieldKind::Integer => "an integer",
            FieldKind::Array => "an array",
            FieldKind::Object => "an object",
            FieldKind::NullableString => "a string or null",
        }
    }

    fn placeholder(self) -> &'static str {
        match self {
            FieldKind::String => "\"<文本>\"",
            FieldKind::Bool => "true/false",
            FieldKind::Number => "<数值>",
            FieldKind::Integer => "<整数>",
            FieldKind::Array => "[\"<文本>\", ...]",
            FieldKind::Object => "{\"<键>\": <值>, ...}",
            FieldKind::NullableString => "\"<文本>\" 或 null",
        }
    }

    /// Check `value` and return its normalized form.
    fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (FieldKind::String, Value::String(_))
            | (FieldKind::Bool, Value::Bool(_))
            | (FieldKind::Array, Value::Array(_))
            | (FieldKind::Object, Value::Object(_))
            | (FieldKind::NullableString, Value::String(_) | Value::Null) => Some(value.clone()),
            (FieldKind::Bool, Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (FieldKind::Number, Value::Number(_)) => Some(value.clone()),
            (FieldKind::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            (FieldKind::Integer, Value::Number(n)) => integral(n).map(Value::from),
            (FieldKind::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        }
    }
}

fn integral(n: &serde_json::Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    let f = n.as_f64()?;
    (f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

/// The required fields of an oracle reply, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<(String, FieldKind)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required field.
    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push((name.to_string(), kind));
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Required field names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Parse a raw reply and check it against the schema.
    ///
    /// Fenced or prose-wrapped JSON is unwrapped first. On success the
    /// returned record has every required field in normalized form; extra
    /// fields are kept as-is.
    pub fn validate(&self, raw: &str) -> Result<Record, ExtractionError> {
        let payload = extract_json_from_markdown(raw);
        let value: Value =
            serde_json::from_str(&payload).map_err(|e| ExtractionError::Parse(e.to_string()))?;
        let mut record = match value {
            Value::Object(record) => record,
            other => {
                return Err(ExtractionError::Parse(format!(
                    "expected an object, got {}",
                    json_type_name(&other)
                )))
            }
        };

        for (name, kind) in &self.fields {
            let value = record
                .get(name)
                .ok_or_else(|| ExtractionError::MissingField(name.clone()))?;
            let normalized = kind.coerce(value).ok_or_else(|| ExtractionError::WrongType {
                field: name.clone(),
                expected: kind.expected(),
                found: truncate(&value.to_string(), 60),
            })?;
            record.insert(name.clone(), normalized);
        }

        Ok(record)
    }

    /// A JSON template describing the expected reply.
    pub fn format_reminder(&self) -> String {
        let body = self
            .fields
            .iter()
            .map(|(name, kind)| format!("  \"{name}\": {}", kind.placeholder()))
            .collect::<Vec<_>>()
            .join(",\n");
        format!("请严格按照以下JSON格式返回结果，不要包含任何其他文字说明：\n{{\n{body}\n}}")
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// The prompt sent on every attempt after the first.
pub fn escalation_prompt(original: &str, schema: &Schema) -> String {
    format!(
        "{original}\n\n{RETRY_NOTICE}\n{}\n\n{RETRY_INSTRUCTION}",
        schema.format_reminder()
    )
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Settings for every oracle call made through an [`Extractor`].
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Model identifier passed to the oracle.
    pub model: String,
    /// System prompt; [`DEFAULT_SYSTEM_PROMPT`] when `None`.
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Attempts per extraction. 0 is treated as 1.
    pub max_attempts: u32,
    /// Timeout applied to each attempt separately.
    pub attempt_timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            system_prompt: None,
            max_tokens: 4096,
            temperature: 0.0,
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

/// Result of one extraction. Never an error: `defaulted` tells the caller
/// whether `value` came from the oracle or from the fallback.
#[derive(Debug, Clone)]
pub struct Extraction<T> {
    pub value: T,
    /// Oracle calls made.
    pub attempts: u32,
    /// `true` when every attempt failed and `value` is the caller's default.
    pub defaulted: bool,
    /// Reason the last failed attempt failed, if any attempt failed.
    pub last_error: Option<ExtractionError>,
}

impl<T> Extraction<T> {
    /// Transform the value, keeping the bookkeeping.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Extraction<U> {
        Extraction {
            value: f(self.value),
            attempts: self.attempts,
            defaulted: self.defaulted,
            last_error: self.last_error,
        }
    }
}

/// Runs the retry protocol against one oracle.
///
/// Stateless between calls; cloning is cheap.
#[derive(Clone)]
pub struct Extractor {
    oracle: Arc<dyn Oracle>,
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(oracle: Arc<dyn Oracle>, config: ExtractorConfig) -> Self {
        Self { oracle, config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// A copy that sends `system_prompt` with every call.
    pub fn with_system_prompt(&self, system_prompt: &str) -> Self {
        let mut config = self.config.clone();
        config.system_prompt = Some(system_prompt.to_string());
        Self {
            oracle: Arc::clone(&self.oracle),
            config,
        }
    }

    /// Obtain a record with every field of `schema`, or `default()`.
    pub async fn extract<D>(&self, prompt: &str, schema: &Schema, default: D) -> Extraction<Record>
    where
        D: FnOnce() -> Record,
    {
        self.extract_with(prompt, schema, Ok, default).await
    }

    /// Like [`extract`](Self::extract), with a typed acceptance step.
    ///
    /// An `Err` from `accept` consumes an attempt exactly like a parse failure.
    pub async fn extract_with<T, A, D>(
        &self,
        prompt: &str,
        schema: &Schema,
        accept: A,
        default: D,
    ) -> Extraction<T>
    where
        A: Fn(Record) -> Result<T, ExtractionError>,
        D: FnOnce() -> T,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut escalation: Option<String> = None;
        let mut last_error = None;
        let mut attempts = 0;

        while attempts < max_attempts {
            attempts += 1;
            let text = if attempts == 1 {
                prompt
            } else {
                escalation
                    .get_or_insert_with(|| escalation_prompt(prompt, schema))
                    .as_str()
            };

            let error = match self.send(text).await {
                Ok(raw) => match schema.validate(&raw).and_then(&accept) {
                    Ok(value) => {
                        debug!(attempt = attempts, "oracle reply accepted");
                        return Extraction {
                            value,
                            attempts,
                            defaulted: false,
                            last_error,
                        };
                    }
                    Err(e) => {
                        warn!(
                            attempt = attempts,
                            max_attempts,
                            error = %e,
                            reply = %truncate(&raw, 200),
                            "oracle reply rejected"
                        );
                        e
                    }
                },
                Err(SendError::Permanent(e)) => {
                    warn!(attempt = attempts, error = %e, "permanent oracle failure, not retrying");
                    last_error = Some(e);
                    break;
                }
                Err(SendError::Retryable(e)) => {
                    warn!(attempt = attempts, max_attempts, error = %e, "oracle call failed");
                    e
                }
            };
            last_error = Some(error);
        }

        warn!(attempts, "all oracle attempts failed, using default");
        Extraction {
            value: default(),
            attempts,
            defaulted: true,
            last_error,
        }
    }

    /// One oracle call under the per-attempt timeout.
    async fn send(&self, prompt: &str) -> Result<String, SendError> {
        let request = OracleRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            system_prompt: Some(
                self.config
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            ),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        match tokio::time::timeout(self.config.attempt_timeout, self.oracle.call(&request)).await {
            Ok(Ok(response)) => Ok(response.content),
            Ok(Err(e)) => {
                let permanent = e
                    .downcast_ref::<OracleError>()
                    .is_some_and(OracleError::is_permanent);
                let error = ExtractionError::Transport(format!("{e:#}"));
                Err(if permanent {
                    SendError::Permanent(error)
                } else {
                    SendError::Retryable(error)
                })
            }
            Err(_) => Err(SendError::Retryable(ExtractionError::Timeout(
                self.config.attempt_timeout.as_millis() as u64,
            ))),
        }
    }
}

enum SendError {
    Retryable(ExtractionError),
    Permanent(ExtractionError),
}
