//! OpenAI-compatible LLM client.
//!
//! Covers hosted APIs and local LM Studio servers behind one HTTP shape.
//! Transport failures go through the shared retry policy; a model that the
//! backend reports as missing or unloaded is marked unavailable in a
//! process-wide status cache and the client switches to the next configured
//! fallback model.

use crate::agent::extract;
use crate::agent::types::*;
use crate::config::{ApiType, LlmConfig};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::tools::ToolCall;
use parking_lot::{Mutex, RwLock};
use reqwest::{header, Client};
use secrecy::ExposeSecret;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Process-wide record of models proven unavailable.
#[derive(Default)]
pub struct ModelStatusCache {
    unavailable: Mutex<HashSet<String>>,
}

impl ModelStatusCache {
    /// Create an empty cache (tests construct their own).
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared process-wide instance.
    pub fn global() -> Arc<ModelStatusCache> {
        static GLOBAL: OnceLock<Arc<ModelStatusCache>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(ModelStatusCache::new())).clone()
    }

    /// Record a model as unavailable.
    pub fn mark_unavailable(&self, model: &str) {
        self.unavailable.lock().insert(model.to_string());
    }

    /// Whether a model has been proven unavailable.
    pub fn is_unavailable(&self, model: &str) -> bool {
        self.unavailable.lock().contains(model)
    }

    /// Forget all recorded failures.
    pub fn clear(&self) {
        self.unavailable.lock().clear();
    }
}

/// Per-client performance counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientMetrics {
    /// Requests issued (per logical call, not per retry)
    pub request_count: u64,
    /// Total tokens reported by the backend
    pub total_tokens: u64,
    /// Latency of the most recent request in milliseconds
    pub last_latency_ms: u64,
    /// Fallback model switches performed since the last reset
    pub fallback_attempts: u32,
}

/// Normalised result of a tool-enabled chat call.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// The assistant message, with any free-text tool requests already
    /// lifted into `tool_calls`
    pub message: Message,
    /// Usage counters when the backend provided them
    pub usage: Option<Usage>,
    /// Model that served the request
    pub model: String,
    /// Request latency in milliseconds
    pub latency_ms: u64,
    /// True when tool calls were recovered from free text; the caller should
    /// append [`extract::STRUCTURED_INTERFACE_NUDGE`] as a system note
    pub extracted_free_text: bool,
}

/// Chat-completion client for OpenAI-compatible backends.
pub struct LlmClient {
    http: Client,
    config: LlmConfig,
    retry: RetryPolicy,
    current_model: RwLock<String>,
    metrics: Mutex<ClientMetrics>,
    model_status: Arc<ModelStatusCache>,
}

impl LlmClient {
    /// Create a client using the process-wide model status cache.
    pub fn new(config: LlmConfig) -> Result<Self> {
        Self::with_status_cache(config, ModelStatusCache::global())
    }

    /// Create a client with an explicit model status cache.
    pub fn with_status_cache(config: LlmConfig, model_status: Arc<ModelStatusCache>) -> Result<Self> {
        let mut headers = header::HeaderMap::new();

        let api_key = match config.api_type {
            // LM Studio accepts any placeholder key.
            ApiType::LmStudio if config.api_key.expose_secret().is_empty() => "lm-studio".to_string(),
            _ => config.api_key.expose_secret().to_string(),
        };
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        let retry = RetryPolicy::with_attempts(config.max_retries.max(1));

        Ok(LlmClient {
            http,
            current_model: RwLock::new(config.model.clone()),
            config,
            retry,
            metrics: Mutex::new(ClientMetrics::default()),
            model_status,
        })
    }

    /// The model currently targeted (may be a fallback).
    pub fn current_model(&self) -> String {
        self.current_model.read().clone()
    }

    /// Restore the configured model and zero the fallback counter.
    pub fn reset_model(&self) {
        *self.current_model.write() = self.config.model.clone();
        self.metrics.lock().fallback_attempts = 0;
        info!("Reset to original model: {}", self.config.model);
    }

    /// Snapshot of the performance counters.
    pub fn metrics(&self) -> ClientMetrics {
        *self.metrics.lock()
    }

    /// Plain chat completion.
    pub async fn complete(
        &self,
        messages: Vec<Message>,
        options: GenerationOptions,
    ) -> Result<(String, CompletionMetadata)> {
        let started = Instant::now();
        let response = self
            .request_with_failover(&messages, None, None, &options)
            .await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("Empty response from LLM".into()))?;

        self.track(latency_ms, response.usage.as_ref());

        Ok((
            choice.message.content,
            CompletionMetadata {
                model: response.model,
                usage: response.usage,
                latency_ms,
            },
        ))
    }

    /// Tool-enabled chat completion, normalised per the module docs.
    pub async fn chat_with_tools(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        tool_choice: ToolChoice,
        options: GenerationOptions,
    ) -> Result<ChatOutcome> {
        let started = Instant::now();
        let tools = if tools.is_empty() { None } else { Some(tools) };
        let tool_choice = tools.as_ref().map(|_| tool_choice);
        let response = self
            .request_with_failover(&messages, tools, tool_choice, &options)
            .await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("Empty response from LLM".into()))?;

        self.track(latency_ms, response.usage.as_ref());

        let mut message = choice.message;
        message.role = Role::Assistant;
        let mut extracted_free_text = false;

        // A tool-only turn (empty content, nonempty tool_calls) is valid and
        // passes through untouched. Free-text requests are only looked for
        // when the structured field is absent.
        if !message.has_tool_calls() && !message.content.is_empty() {
            if let Some(extracted) = extract::extract_tool_calls(&message.content) {
                info!(
                    "Recovered {} tool calls from assistant text",
                    extracted.calls.len()
                );
                message.content = extracted.cleaned_content;
                message.tool_calls = Some(extracted.calls);
                extracted_free_text = true;
            }
        }

        Ok(ChatOutcome {
            message,
            usage: response.usage,
            model: response.model,
            latency_ms,
            extracted_free_text,
        })
    }

    /// Embeddings are not offered by these backends.
    pub async fn embed(&self, _text: &str, _model: &str) -> Result<Vec<f32>> {
        Err(Error::NotSupported(
            "Embeddings are not supported by the configured backend".into(),
        ))
    }

    async fn request_with_failover(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
        tool_choice: Option<ToolChoice>,
        options: &GenerationOptions,
    ) -> Result<ChatCompletionResponse> {
        self.metrics.lock().request_count += 1;

        loop {
            let model = self.current_model();
            let request = ChatCompletionRequest {
                model: model.clone(),
                messages: messages.to_vec(),
                max_tokens: options.max_tokens.or(Some(self.config.max_tokens)),
                temperature: options.temperature.or(Some(self.config.temperature)),
                top_p: options.top_p,
                stop: options.stop.clone(),
                tools: tools.clone(),
                tool_choice: tool_choice.clone(),
            };

            let result = self.retry.run(|| self.send_request(&request)).await;

            match result {
                Ok(response) => return Ok(response),
                Err(Error::ModelUnavailable(reason)) => {
                    self.model_status.mark_unavailable(&model);
                    if !self.advance_fallback(&model) {
                        return Err(Error::ModelUnavailable(format!(
                            "Model unavailable and no fallbacks left: {}",
                            reason
                        )));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Switch to the first configured fallback not known to be unavailable.
    fn advance_fallback(&self, failed_model: &str) -> bool {
        let mut metrics = self.metrics.lock();
        metrics.fallback_attempts += 1;
        if metrics.fallback_attempts > self.config.max_fallback_attempts {
            warn!(
                "Maximum fallback attempts ({}) reached",
                self.config.max_fallback_attempts
            );
            return false;
        }
        drop(metrics);

        for fallback in &self.config.fallback_models {
            if fallback == failed_model || self.model_status.is_unavailable(fallback) {
                continue;
            }
            warn!("Falling back from {} to {}", failed_model, fallback);
            *self.current_model.write() = fallback.clone();
            return true;
        }

        false
    }

    async fn send_request(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));
        debug!("Sending chat completion: model={}", request.model);

        let response = self.http.post(&url).json(request).send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.json::<ChatCompletionResponse>().await?;
            if let Some(ref usage) = body.usage {
                debug!("LLM response: model={}, tokens={}", body.model, usage.total_tokens);
            }
            return Ok(body);
        }

        let error_text = response.text().await.unwrap_or_default();
        if is_model_missing(status.as_u16(), &error_text) {
            return Err(Error::ModelUnavailable(format!(
                "{} ({}): {}",
                request.model, status, error_text
            )));
        }

        match status.as_u16() {
            429 => {
                warn!("Rate limit exceeded: {}", error_text);
                Err(Error::RateLimit(error_text))
            }
            401 => Err(Error::Unauthorized("Invalid API key".to_string())),
            400..=499 => Err(Error::InvalidInput(format!(
                "API rejected request ({}): {}",
                status, error_text
            ))),
            _ => Err(Error::Llm(format!("API error ({}): {}", status, error_text))),
        }
    }

    fn track(&self, latency_ms: u64, usage: Option<&Usage>) {
        let mut metrics = self.metrics.lock();
        metrics.last_latency_ms = latency_ms;
        if let Some(usage) = usage {
            metrics.total_tokens += usage.total_tokens as u64;
        }
    }
}

fn is_model_missing(status: u16, error_text: &str) -> bool {
    let lowered = error_text.to_lowercase();
    status == 404
        || lowered.contains("model_not_found")
        || lowered.contains("model not found")
        || lowered.contains("model unloaded")
}

/// Decode the assistant's structured tool calls into executor-level calls.
/// Argument strings that fail to parse are kept verbatim with `parse_error`
/// set so the model can be asked to correct itself.
pub fn normalize_tool_calls(message: &Message) -> Vec<ToolCall> {
    let Some(ref calls) = message.tool_calls else {
        return Vec::new();
    };

    calls
        .iter()
        .map(|call| {
            let raw = call.function.arguments.trim();
            if raw.is_empty() {
                return ToolCall::new(&call.id, &call.function.name, serde_json::json!({}));
            }
            match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(value) if value.is_object() => {
                    ToolCall::new(&call.id, &call.function.name, value)
                }
                Ok(other) => ToolCall {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    arguments: other,
                    parse_error: Some("Arguments are not a JSON object".to_string()),
                },
                Err(e) => {
                    warn!(
                        "Failed to parse tool arguments for {}: {}",
                        call.function.name, e
                    );
                    ToolCall {
                        id: call.id.clone(),
                        name: call.function.name.clone(),
                        arguments: serde_json::Value::String(raw.to_string()),
                        parse_error: Some(e.to_string()),
                    }
                }
            }
        })
        .collect()
}
