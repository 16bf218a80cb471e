//! LLM capability used by every research stage.
//!
//! `LlmProvider` is the seam to concrete backends. `Brain` wraps a provider
//! with the session-wide context budget, retry with exponential backoff on
//! transient errors, and usage accounting, and exposes the single
//! `generate(prompt, context)` operation the research engine relies on.

use crate::error::LlmError;
use crate::text::{char_len, truncate_chars};
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Trait for LLM providers (OpenAI-compatible, Anthropic, mock).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// System prompt shared by all research calls.
pub const RESEARCH_SYSTEM_PROMPT: &str = "You are a meticulous research assistant. \
You plan investigations, write precise web search queries, judge which sources are worth reading, \
and answer strictly from the evidence you are given. When evidence is missing, say so.";

/// Placed between context and prompt in the user message.
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Default session-wide budget for prompt plus context, in characters.
pub const DEFAULT_CONTEXT_BUDGET_CHARS: usize = 12_000;

/// Wraps an `LlmProvider` with budgeting, retries and usage tracking.
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    system_prompt: String,
    context_budget_chars: usize,
    temperature: f32,
    top_p: Option<f32>,
    max_tokens: Option<usize>,
    max_retries: usize,
    retry_base_delay: Duration,
    total_usage: Mutex<TokenUsage>,
}

impl Brain {
    pub fn new(provider: Arc<dyn LlmProvider>, system_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            system_prompt: system_prompt.into(),
            context_budget_chars: DEFAULT_CONTEXT_BUDGET_CHARS,
            temperature: 0.7,
            top_p: None,
            max_tokens: None,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            total_usage: Mutex::new(TokenUsage::default()),
        }
    }

    /// Set the session-wide prompt+context budget.
    pub fn with_context_budget(mut self, chars: usize) -> Self {
        self.context_budget_chars = chars;
        self
    }

    /// Configure retry count and the first backoff delay.
    pub fn with_retry(mut self, max_retries: usize, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, top_p: Option<f32>) -> Self {
        self.temperature = temperature;
        self.top_p = top_p;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn context_budget(&self) -> usize {
        self.context_budget_chars
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Accumulated token usage across all calls.
    pub fn total_usage(&self) -> TokenUsage {
        *self
            .total_usage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ask the LLM `prompt` against `context` and return its text.
    ///
    /// The context is cut so that prompt plus context fit the session budget.
    /// A prompt that alone exceeds the budget is rejected with
    /// `ContextOverflow`.
    pub async fn generate(&self, prompt: &str, context: &str) -> Result<String, LlmError> {
        let prompt_len = char_len(prompt);
        if prompt_len > self.context_budget_chars {
            return Err(LlmError::ContextOverflow {
                used: prompt_len,
                limit: self.context_budget_chars,
            });
        }

        let allowed = self
            .context_budget_chars
            .saturating_sub(prompt_len + CONTEXT_SEPARATOR.len());
        let context = if char_len(context) > allowed {
            debug!(
                context_chars = char_len(context),
                allowed, "Truncating LLM context to budget"
            );
            truncate_chars(context, allowed)
        } else {
            context
        };

        let user = if context.trim().is_empty() {
            prompt.to_string()
        } else {
            format!("{context}{CONTEXT_SEPARATOR}{prompt}")
        };

        let request = CompletionRequest {
            messages: vec![Message::system(&self.system_prompt), Message::user(user)],
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            model: None,
        };

        let response = self.complete_with_retry(request).await?;
        Ok(response.message.content.trim().to_string())
    }

    /// Send a completion request, retrying transient errors with exponential
    /// backoff (base, 2x base, 4x base, ..., capped at 32s).
    async fn complete_with_retry(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let mut attempt = 0usize;
        loop {
            match self.provider.complete(request.clone()).await {
                Ok(response) => {
                    self.total_usage
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .accumulate(&response.usage);
                    return Ok(response);
                }
                Err(e) if Self::is_retryable(&e) && attempt < self.max_retries => {
                    let backoff = self
                        .retry_base_delay
                        .saturating_mul(1u32 << attempt.min(16))
                        .min(Duration::from_secs(32));
                    let wait = match &e {
                        LlmError::RateLimited { retry_after_secs } => {
                            backoff.max(Duration::from_secs(*retry_after_secs).min(
                                Duration::from_secs(32),
                            ))
                        }
                        _ => backoff,
                    };
                    info!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        backoff_ms = wait.as_millis() as u64,
                        error = %e,
                        "Retrying after transient LLM error"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(error = %e, model = self.provider.model_name(), "LLM call failed");
                    return Err(e);
                }
            }
        }
    }

    /// Check if an LLM error is transient and should be retried.
    pub fn is_retryable(error: &LlmError) -> bool {
        matches!(
            error,
            LlmError::RateLimited { .. } | LlmError::Timeout { .. } | LlmError::Connection { .. }
        )
    }
}

type Responder = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// A mock LLM provider for testing and development.
///
/// Queued responses are served first. When the queue is empty the optional
/// responder is consulted with the last user message, then a fixed default
/// is returned.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    responder: Option<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(VecDeque::new()),
            responder: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        let text = text.to_string();
        Self::with_responder(move |_| Some(text.clone()))
    }

    /// Create a MockLlmProvider that routes on the prompt text.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.lock_responses().push_back(Ok(response));
    }

    /// Queue an error to be returned by the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.lock_responses().push_back(Err(error));
    }

    /// Every user prompt received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    fn lock_responses(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<CompletionResponse, LlmError>>> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request.last_user_text().unwrap_or_default().to_string();
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt.clone());

        if let Some(queued) = self.lock_responses().pop_front() {
            return queued;
        }
        if let Some(text) = self.responder.as_ref().and_then(|r| r(&prompt)) {
            return Ok(Self::text_response(&text));
        }
        Ok(Self::text_response(
            "I'm a mock LLM. No queued responses available.",
        ))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
