//! Unified LLM client over two wire protocols.
//!
//! The native backend speaks a messages API (system prompt as a top-level
//! field); the OpenAI-compatible backend speaks chat-completions (system as
//! the first message, `response_format` passthrough). Callers see one
//! request/response shape either way.

pub mod tokens;

use crate::config::{Config, LlmProvider};
use crate::error::{PodscrubError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// JSON-only instruction appended to the system prompt when the backend does
/// not enforce `response_format` natively.
const JSON_OUTPUT_INSTRUCTION: &str = "\n\n<output_format>CRITICAL JSON REQUIREMENTS:\n\
1. Respond with ONLY valid JSON - no markdown, no ```json, no text\n\
2. Start directly with '[' or '{', end with ']' or '}'\n\
3. Use double quotes for strings, no trailing commas\n\
4. Use null for missing values\n\
Malformed JSON causes parsing failures.</output_format>";

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Requested response format; only `json_object` is meaningful today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    JsonObject,
}

/// One completion request, backend-agnostic.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub timeout: Duration,
    pub response_format: Option<ResponseFormat>,
}

/// Unified response from any backend.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Narrow contract over the LLM backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a completion request and return the unified response.
    async fn messages_create(&self, request: LlmRequest) -> Result<LlmResponse>;

    /// Provider name for logging.
    fn provider_name(&self) -> &str;
}

/// Build the configured client.
pub fn client_from_config(config: &Config, http: reqwest::Client) -> Box<dyn LlmClient> {
    match config.llm_provider {
        LlmProvider::Native => {
            info!("LLM provider: native ({})", config.llm_base_url);
            Box::new(NativeClient::new(
                http,
                config.llm_base_url.clone(),
                config.llm_api_key.clone(),
            ))
        }
        LlmProvider::OpenAiCompat => {
            info!("LLM provider: openai-compatible ({})", config.llm_base_url);
            Box::new(OpenAiCompatClient::new(
                http,
                config.llm_base_url.clone(),
                config.llm_api_key.clone(),
            ))
        }
    }
}

fn record_response_usage(response: &LlmResponse) {
    if let Some(usage) = response.usage {
        tokens::record_usage(usage.input_tokens, usage.output_tokens);
    }
}

// ── Native backend ──────────────────────────────────────────────────────

/// Native messages-API client.
pub struct NativeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NativeClient {
    pub fn new(http: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            http,
            base_url,
            api_key,
        }
    }
}

#[derive(Deserialize)]
struct NativeResponse {
    content: Vec<NativeContent>,
    model: String,
    usage: Option<NativeUsage>,
}

#[derive(Deserialize)]
struct NativeContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct NativeUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait]
impl LlmClient for NativeClient {
    async fn messages_create(&self, request: LlmRequest) -> Result<LlmResponse> {
        // The native API has no response_format parameter; enforce JSON
        // through an explicit instruction block instead.
        let mut system = request.system.clone();
        if request.response_format == Some(ResponseFormat::JsonObject)
            && !system.contains("<output_format>")
        {
            system.push_str(JSON_OUTPUT_INSTRUCTION);
            debug!("Added JSON format instructions to system prompt");
        }

        let body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": system,
            "messages": request.messages,
        });

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| PodscrubError::LlmError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PodscrubError::LlmError(format!(
                "native backend returned {status}: {}",
                detail.chars().take(300).collect::<String>()
            )));
        }

        let parsed: NativeResponse = response
            .json()
            .await
            .map_err(|e| PodscrubError::LlmError(format!("bad native response: {e}")))?;

        let llm_response = LlmResponse {
            content: parsed
                .content
                .first()
                .map(|c| c.text.clone())
                .unwrap_or_default(),
            model: parsed.model,
            usage: parsed.usage.map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
        };
        record_response_usage(&llm_response);
        Ok(llm_response)
    }

    fn provider_name(&self) -> &str {
        "native"
    }
}

// ── OpenAI-compatible backend ───────────────────────────────────────────

/// OpenAI-compatible chat-completions client (local wrappers, Ollama, etc.)
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatClient {
    pub fn new(http: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            http,
            base_url,
            api_key,
        }
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    model: String,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn messages_create(&self, request: LlmRequest) -> Result<LlmResponse> {
        // System prompt travels as the first message in this protocol
        let mut all_messages = vec![json!({"role": "system", "content": request.system})];
        for m in &request.messages {
            all_messages.push(json!({"role": m.role, "content": m.content}));
        }

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": all_messages,
        });
        if request.response_format == Some(ResponseFormat::JsonObject) {
            body["response_format"] = json!({"type": "json_object"});
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| PodscrubError::LlmError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PodscrubError::LlmError(format!(
                "openai-compatible backend returned {status}: {}",
                detail.chars().take(300).collect::<String>()
            )));
        }

        let parsed: OpenAiResponse = response.json().await.map_err(|e| {
            PodscrubError::LlmError(format!("bad openai-compatible response: {e}"))
        })?;

        let Some(choice) = parsed.choices.into_iter().next() else {
            warn!("OpenAI-compatible backend returned no choices");
            return Err(PodscrubError::LlmError("empty choices".to_string()));
        };

        let llm_response = LlmResponse {
            content: choice.message.content,
            model: parsed.model,
            usage: parsed.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        };
        record_response_usage(&llm_response);
        Ok(llm_response)
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_instruction_appended_once() {
        let mut system = String::from("Detect ads.");
        if !system.contains("<output_format>") {
            system.push_str(JSON_OUTPUT_INSTRUCTION);
        }
        assert!(system.contains("<output_format>"));
        // Second application is a no-op
        let before = system.clone();
        if !system.contains("<output_format>") {
            system.push_str(JSON_OUTPUT_INSTRUCTION);
        }
        assert_eq!(system, before);
    }

    #[test]
    fn test_native_response_parsing() {
        let raw = r#"{
            "content": [{"type": "text", "text": "[{\"start\": 1}]"}],
            "model": "claude-sonnet-4-5-20250929",
            "usage": {"input_tokens": 120, "output_tokens": 15}
        }"#;
        let parsed: NativeResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content[0].text, "[{\"start\": 1}]");
        assert_eq!(parsed.usage.unwrap().input_tokens, 120);
    }

    #[test]
    fn test_openai_response_parsing() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": "[]"}}],
            "model": "gpt-x",
            "usage": {"prompt_tokens": 80, "completion_tokens": 2}
        }"#;
        let parsed: OpenAiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "[]");
        assert_eq!(parsed.usage.unwrap().completion_tokens, 2);
    }
}
