//! Chat-model access with retry and ordered model fallback.
//!
//! # Architecture
//!
//! - [`ChatModel`]: one named model that turns a system + user prompt into text
//! - [`OpenAiChatModel`]: OpenAI-compatible `/chat/completions` client
//! - [`RetryAsk`]: decorator that retries transient failures of one model
//! - [`ModelPool`]: pre-built clients tried strictly in order, one at a time
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```
//!
//! Fallback across models never races requests; every call has a real cost.

use crate::config::LlmConfig;
use crate::error::LlmError;
use async_trait::async_trait;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// A single named chat model.
#[async_trait]
pub trait ChatModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;
}

impl LlmError {
    /// Whether retrying the same model can help.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Request { .. } => true,
            LlmError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Exponential backoff with jitter for the given 1-based attempt.
pub fn backoff_delay(attempt: usize, base_delay: StdDuration, max_delay: StdDuration) -> StdDuration {
    let shift = attempt.saturating_sub(1).min(16) as u32;
    let mut delay = base_delay.saturating_mul(1 << shift);
    if delay > max_delay {
        delay = max_delay;
    }
    let jitter_ms: u64 = rng().random_range(0..=250);
    delay + StdDuration::from_millis(jitter_ms)
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client bound to one model.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiChatModel {
    /// Client for `model` using the endpoint, key and sampling settings of `config`.
    ///
    /// The `reqwest::Client` is shared across models so connections are pooled.
    pub fn new(client: reqwest::Client, config: &LlmConfig, model: impl Into<String>) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: model.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

impl fmt::Debug for OpenAiChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiChatModel")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let t0 = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let request_err = |source| LlmError::Request {
            model: self.model.clone(),
            source,
        };
        let response = builder.send().await.map_err(request_err)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                model: self.model.clone(),
                status: status.as_u16(),
                body,
            });
        }
        let parsed: ChatResponse = response.json().await.map_err(request_err)?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyCompletion {
                model: self.model.clone(),
            })?;

        debug!(elapsed_ms = t0.elapsed().as_millis() as u64, chars = text.len(), "Completion received");
        Ok(text)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`ChatModel`].
///
/// Only transient failures (transport errors, 429, 5xx) are retried.
pub struct RetryAsk<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: ChatModel,
{
    /// Wrap `inner`, retrying retryable errors up to `max_retries` times.
    ///
    /// # Arguments
    ///
    /// * `inner` - The model to call
    /// * `max_retries` - Extra attempts after the first failure
    /// * `base_delay` - Delay before the first retry; doubles per attempt
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T: ChatModel> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("inner", &self.inner)
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

#[async_trait]
impl<T> ChatModel for RetryAsk<T>
where
    T: ChatModel,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    #[instrument(level = "info", skip_all, fields(model = %self.inner.name()))]
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.generate(system_prompt, user_prompt).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries || !e.is_retryable() {
                        warn!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "generate() giving up on model"
                        );
                        return Err(e);
                    }

                    let delay = backoff_delay(attempt, self.base_delay, self.max_delay);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "generate() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Ordered set of pre-constructed model clients.
#[derive(Debug, Clone)]
pub struct ModelPool {
    models: Vec<Arc<dyn ChatModel>>,
}

impl ModelPool {
    /// Pool over already-built clients, tried in the given order.
    ///
    /// # Arguments
    ///
    /// * `models` - Primary model first, then fallbacks. An empty pool makes
    ///   every call fail with [`LlmError::NoModels`].
    pub fn new(models: Vec<Arc<dyn ChatModel>>) -> Self {
        Self { models }
    }

    /// Build one retrying OpenAI-compatible client per configured model.
    pub fn from_config(config: &LlmConfig) -> Self {
        let client = reqwest::Client::new();
        let models = config
            .models()
            .into_iter()
            .map(|name| {
                let model = OpenAiChatModel::new(client.clone(), config, name);
                Arc::new(RetryAsk::new(model, config.max_retries, StdDuration::from_secs(1)))
                    as Arc<dyn ChatModel>
            })
            .collect();
        Self { models }
    }

    /// Names of the pooled models in fallback order.
    pub fn model_names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name().to_string()).collect()
    }

    /// Try each model in order until one answers.
    ///
    /// Calls are strictly sequential; a later model is only asked after the
    /// previous one failed.
    ///
    /// # Arguments
    ///
    /// * `system_prompt` - Instructions shared by every model
    /// * `user_prompt` - The request itself
    ///
    /// # Returns
    ///
    /// `(model_name, text)` from the first model that answered, or
    /// [`LlmError::AllModelsFailed`] listing every model tried.
    #[instrument(level = "info", skip_all, fields(models = self.models.len()))]
    pub async fn generate_with_fallback(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<(String, String), LlmError> {
        if self.models.is_empty() {
            return Err(LlmError::NoModels);
        }

        let mut attempted = Vec::with_capacity(self.models.len());
        for model in &self.models {
            let name = model.name().to_string();
            match model.generate(system_prompt, user_prompt).await {
                Ok(text) => {
                    if !attempted.is_empty() {
                        info!(model = %name, failed = ?attempted, "Fallback model answered");
                    }
                    return Ok((name, text));
                }
                Err(e) => {
                    warn!(model = %name, error = %e, "Model failed; trying next");
                    attempted.push(name);
                }
            }
        }

        error!(attempted = ?attempted, "All models failed");
        Err(LlmError::AllModelsFailed { attempted })
    }
}
