//! Scripted oracle for tests and offline dry runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::traits::{ModelInfo, Oracle, OracleRequest, OracleResponse, TokenUsage};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text.
    Text(String),
    /// Fail the call with this transport error message.
    Fail(String),
}

/// A mock oracle.
///
/// Reply selection, in order: the first queued reply; the first route whose
/// key is a substring of the prompt; the fallback reply.
pub struct MockOracle {
    /// Replies consumed one per call.
    queue: Mutex<VecDeque<MockReply>>,
    /// Prompt substring → reply, checked in insertion order.
    routes: Vec<(String, MockReply)>,
    /// Reply when neither the queue nor a route applies.
    fallback: MockReply,
    /// Artificial latency per call.
    delay: Option<Duration>,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Every prompt received, in order.
    prompts: Mutex<Vec<String>>,
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOracle {
    /// A mock that answers `{}` to everything.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            routes: Vec::new(),
            fallback: MockReply::Text("{}".to_string()),
            delay: None,
            call_count: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A mock that always returns the same text.
    pub fn with_fixed_response(response: &str) -> Self {
        Self::new().with_fallback(response)
    }

    /// Queue a reply.
    pub fn with_reply(self, response: &str) -> Self {
        lock(&self.queue).push_back(MockReply::Text(response.to_string()));
        self
    }

    /// Queue a transport failure.
    pub fn with_failure(self, message: &str) -> Self {
        lock(&self.queue).push_back(MockReply::Fail(message.to_string()));
        self
    }

    /// Answer prompts containing `key` with `response`.
    pub fn with_route(mut self, key: &str, response: &str) -> Self {
        self.routes
            .push((key.to_string(), MockReply::Text(response.to_string())));
        self
    }

    /// Replace the fallback reply.
    pub fn with_fallback(mut self, response: &str) -> Self {
        self.fallback = MockReply::Text(response.to_string());
        self
    }

    /// Delay every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of calls made to this oracle.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// All prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    fn next_reply(&self, prompt: &str) -> MockReply {
        if let Some(reply) = lock(&self.queue).pop_front() {
            return reply;
        }
        self.routes
            .iter()
            .find(|(key, _)| prompt.contains(key.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Oracle for MockOracle {
    fn name(&self) -> &str {
        "mock"
    }

    async fn call(&self, request: &OracleRequest) -> anyhow::Result<OracleResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        lock(&self.prompts).push(request.prompt.clone());

        let reply = self.next_reply(&request.prompt);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let content = match reply {
            MockReply::Text(text) => text,
            MockReply::Fail(message) => anyhow::bail!(message),
        };

        let prompt_tokens = (request.prompt.chars().count() / 2) as u32; // Rough estimate
        let completion_tokens = (content.chars().count() / 2) as u32;

        Ok(OracleResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
        }]
    }
}
