//! # Completion Backends
//!
//! Integrations with completion providers behind one object-safe trait.
//! Wire formats stay inside each implementation; the rest of the system
//! only sees `CompletionRequest`/`CompletionResponse`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use qforge_core::{redact_secrets, QForgeError, QResult};

/// Quality/cost band a request is routed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Fast,
    Balanced,
    Thorough,
}

impl ModelTier {
    pub const ALL: [ModelTier; 3] = [ModelTier::Fast, ModelTier::Balanced, ModelTier::Thorough];
}

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Provider-agnostic completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub tier: ModelTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Ask the provider for strict JSON output
    #[serde(default)]
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(tier: ModelTier, prompt: impl Into<String>) -> Self {
        Self {
            tier,
            system: None,
            messages: vec![ChatMessage::user(prompt)],
            temperature: 0.2,
            max_tokens: None,
            json_mode: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Coarse token estimate charged against budgets before any provider
    /// is touched: ceil(total characters / 4).
    pub fn estimated_tokens(&self) -> u64 {
        let chars: usize = self.system.as_deref().map(str::len).unwrap_or(0)
            + self.messages.iter().map(|m| m.content.len()).sum::<usize>();
        (chars as u64).div_ceil(4)
    }
}

/// Provider-agnostic completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub tokens_used: u64,
    /// Set when the response was served from the cache
    #[serde(default)]
    pub cached: bool,
    pub latency_ms: u64,
}

/// A completion provider the router can select
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Model this backend serves at the given tier, None when the tier
    /// is not configured for it
    fn model_for(&self, tier: ModelTier) -> Option<String>;

    /// Availability probe. Probed lazily by the router; a failed probe is
    /// never charged against budgets.
    async fn is_available(&self) -> bool;

    async fn complete(&self, request: &CompletionRequest, model: &str)
        -> QResult<CompletionResponse>;
}

// ============================================================================
// OLLAMA BACKEND (local)
// ============================================================================

pub struct OllamaBackend {
    client: Client,
    base_url: String,
    tier_models: HashMap<ModelTier, String>,
}

impl OllamaBackend {
    pub fn new(base_url: Option<String>, tier_models: HashMap<ModelTier, String>) -> QResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(120)).build()?,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            tier_models,
        })
    }
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model_for(&self, tier: ModelTier) -> Option<String> {
        self.tier_models.get(&tier).cloned()
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        model: &str,
    ) -> QResult<CompletionResponse> {
        #[derive(Serialize)]
        struct OllamaRequest<'a> {
            model: &'a str,
            prompt: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            system: Option<&'a str>,
            stream: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            format: Option<&'a str>,
            options: OllamaOptions,
        }

        #[derive(Serialize)]
        struct OllamaOptions {
            temperature: f32,
            #[serde(skip_serializing_if = "Option::is_none")]
            num_predict: Option<u32>,
        }

        #[derive(Deserialize)]
        struct OllamaResponse {
            response: String,
            #[serde(default)]
            eval_count: Option<u64>,
            #[serde(default)]
            prompt_eval_count: Option<u64>,
        }

        let prompt = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let body = OllamaRequest {
            model,
            prompt,
            system: request.system.as_deref(),
            stream: false,
            format: request.json_mode.then_some("json"),
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(self.name(), &e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(QForgeError::Transport {
                provider: self.name().to_string(),
                reason: redact_secrets(&format!("status {status}: {text}")),
            });
        }

        let parsed: OllamaResponse =
            response.json().await.map_err(|e| transport_error(self.name(), &e))?;

        let tokens_used = parsed.eval_count.unwrap_or(0) + parsed.prompt_eval_count.unwrap_or(0);
        debug!(model, tokens_used, "ollama completion finished");

        Ok(CompletionResponse {
            content: parsed.response,
            provider: self.name().to_string(),
            model: model.to_string(),
            tokens_used,
            cached: false,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

// ============================================================================
// ANTHROPIC BACKEND
// ============================================================================

pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    base_url: String,
    tier_models: HashMap<ModelTier, String>,
}

impl AnthropicBackend {
    pub fn new(api_key: String, tier_models: HashMap<ModelTier, String>) -> QResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(120)).build()?,
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
            tier_models,
        })
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl CompletionBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model_for(&self, tier: ModelTier) -> Option<String> {
        self.tier_models.get(&tier).cloned()
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        model: &str,
    ) -> QResult<CompletionResponse> {
        #[derive(Serialize)]
        struct AnthropicRequest<'a> {
            model: &'a str,
            max_tokens: u32,
            #[serde(skip_serializing_if = "Option::is_none")]
            system: Option<&'a str>,
            messages: Vec<WireMessage<'a>>,
            temperature: f32,
        }

        #[derive(Serialize)]
        struct WireMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct AnthropicResponse {
            content: Vec<ContentBlock>,
            usage: Usage,
            model: String,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(default)]
            text: String,
        }

        #[derive(Deserialize)]
        struct Usage {
            input_tokens: u64,
            output_tokens: u64,
        }

        let messages = request
            .messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                },
                content: &m.content,
            })
            .collect();

        let body = AnthropicRequest {
            model,
            max_tokens: request.max_tokens.unwrap_or(4096),
            system: request.system.as_deref(),
            messages,
            temperature: request.temperature,
        };

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(self.name(), &e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(QForgeError::Transport {
                provider: self.name().to_string(),
                reason: redact_secrets(&format!("status {status}: {text}")),
            });
        }

        let parsed: AnthropicResponse =
            response.json().await.map_err(|e| transport_error(self.name(), &e))?;

        let content = parsed
            .content
            .first()
            .map(|b| b.text.clone())
            .ok_or_else(|| QForgeError::Protocol {
                reason: "anthropic response carried no content blocks".to_string(),
            })?;

        Ok(CompletionResponse {
            content,
            provider: self.name().to_string(),
            model: parsed.model,
            tokens_used: parsed.usage.input_tokens + parsed.usage.output_tokens,
            cached: false,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn transport_error(provider: &str, err: &dyn std::fmt::Display) -> QForgeError {
    QForgeError::Transport {
        provider: provider.to_string(),
        reason: redact_secrets(&err.to_string()),
    }
}
