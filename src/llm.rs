//! Chat model clients used by the intent classifier.
//!
//! - **[`OpenAIChat`]** calls an OpenAI-compatible `POST /v1/chat/completions`.
//! - **[`OllamaChat`]** calls a local Ollama instance's `POST /api/chat`.
//!
//! Use [`create_chat_model`] to build the client selected by `[classifier]`.
//! A `disabled` provider yields no client, and the classifier stage is
//! skipped.
//!
//! Classification is a single short call, so these clients do not retry.
//! A timeout or error surfaces to the classifier, which logs it and falls
//! back to the default strategy.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use strategy_router_core::chat::{ChatCompletion, ChatMessage, ChatModel, ChatOptions, ChatUsage};

use crate::config::ClassifierConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Instantiate the chat client for the configured classifier provider.
///
/// Returns `Ok(None)` when the provider is `disabled`.
pub fn create_chat_model(config: &ClassifierConfig) -> Result<Option<Box<dyn ChatModel>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => Ok(Some(Box::new(OpenAIChat::new(config)?))),
        "ollama" => Ok(Some(Box::new(OllamaChat::new(config)?))),
        other => bail!("Unknown classifier provider: {}", other),
    }
}

fn http_client(config: &ClassifierConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .with_context(|| "Failed to build HTTP client for classifier")
}

fn model_or_default(options: &ChatOptions, fallback: &str) -> String {
    options.model.clone().unwrap_or_else(|| fallback.to_string())
}

// ============ OpenAI ============

/// Chat client for the OpenAI API or any server exposing the same
/// `/v1/chat/completions` endpoint.
///
/// Reads `OPENAI_API_KEY` from the environment. The key is optional when
/// `url` points at a compatible server that does not check it.
pub struct OpenAIChat {
    label: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("classifier.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        if api_key.is_none() && config.url.is_none() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        let base_url = config
            .url
            .as_deref()
            .unwrap_or(OPENAI_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            label: format!("openai:{}", model),
            model,
            base_url,
            api_key,
            client: http_client(config)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatCompletion> {
        let mut body = serde_json::json!({
            "model": model_or_default(options, &self.model),
            "messages": messages,
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = temperature.into();
        }

        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Chat request to {} failed", self.label))?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let parsed: OpenAIResponse = response
            .json()
            .await
            .with_context(|| "Invalid OpenAI chat response")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("Invalid OpenAI chat response: no message content"))?;

        Ok(ChatCompletion {
            content,
            usage: parsed.usage,
        })
    }
}

// ============ Ollama ============

/// Chat client for a local Ollama instance (`stream = false`).
pub struct OllamaChat {
    label: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("classifier.model required for Ollama provider"))?;
        let base_url = config
            .url
            .as_deref()
            .unwrap_or(OLLAMA_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            label: format!("ollama:{}", model),
            model,
            base_url,
            client: http_client(config)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatCompletion> {
        let mut model_options = serde_json::Map::new();
        if let Some(max_tokens) = options.max_tokens {
            model_options.insert("num_predict".to_string(), max_tokens.into());
        }
        if let Some(temperature) = options.temperature {
            model_options.insert("temperature".to_string(), temperature.into());
        }

        let body = serde_json::json!({
            "model": model_or_default(options, &self.model),
            "messages": messages,
            "stream": false,
            "options": model_options,
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Chat request to {} failed", self.label))?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .with_context(|| "Invalid Ollama chat response")?;
        let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
            (Some(prompt_tokens), Some(completion_tokens)) => Some(ChatUsage {
                prompt_tokens,
                completion_tokens,
            }),
            _ => None,
        };

        Ok(ChatCompletion {
            content: parsed.message.content,
            usage,
        })
    }
}
