//! OpenAI-compatible provider implementation.
//!
//! Works with: Ollama, OpenAI, OpenRouter, vLLM, llama.cpp, and any
//! endpoint exposing `/v1/chat/completions`.
//!
//! Supports:
//! - Non-streaming chat completions
//! - JSON mode (`response_format: json_object`)
//! - Context window hints for Ollama (`options.num_ctx`)
//! - Model listing and health checks

use async_trait::async_trait;
use codeloop_core::error::ProviderError;
use codeloop_core::message::Message;
use codeloop_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama ignores the key
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn is_ollama(&self) -> bool {
        self.name == "ollama" || self.base_url.contains(":11434")
    }

    /// Convert our Message types to the chat API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: Some(m.content.clone()),
            })
            .collect()
    }

    /// Build the JSON request body for a completion.
    fn request_body(&self, request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if request.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        if let Some(window) = request.context_window
            && self.is_ollama()
        {
            body["options"] = serde_json::json!({ "num_ctx": window });
        }

        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        body
    }

    async fn get_models(&self) -> Result<reqwest::Response, ProviderError> {
        self.client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))
    }
}

#[async_trait]
impl codeloop_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            json_mode = request.json_mode,
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status == 404 {
            return Err(ProviderError::ModelNotFound(request.model));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        api_response.into_provider_response()
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let response = self.get_models().await?;
        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(self.get_models().await?.status().is_success())
    }
}

// --- Wire types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl ApiResponse {
    fn into_provider_response(self) -> Result<ProviderResponse, ProviderError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let message = Message::assistant(choice.message.content.unwrap_or_default());

        Ok(ProviderResponse {
            message,
            usage: self.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model: self.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_constructor() {
        let p = OpenAiCompatProvider::ollama(None);
        assert_eq!(p.base_url(), "http://localhost:11434/v1");
        assert!(p.is_ollama());
    }

    #[test]
    fn trailing_slash_trimmed() {
        let p = OpenAiCompatProvider::new("vllm", "http://localhost:8000/v1/", "");
        assert_eq!(p.base_url(), "http://localhost:8000/v1");
        assert!(!p.is_ollama());
    }

    #[test]
    fn message_conversion() {
        let msgs = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api = OpenAiCompatProvider::to_api_messages(&msgs);
        assert_eq!(api.len(), 2);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].content.as_deref(), Some("Hello"));
    }

    #[test]
    fn json_mode_sets_response_format() {
        let p = OpenAiCompatProvider::openai("sk-test");
        let mut req = ProviderRequest::new("gpt-4o", vec![Message::user("hi")]);
        req.json_mode = true;
        req.max_tokens = Some(512);
        let body = p.request_body(&req);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["max_tokens"], 512);
        assert!(body.get("options").is_none());
    }

    #[test]
    fn ollama_receives_context_window() {
        let p = OpenAiCompatProvider::ollama(None);
        let mut req = ProviderRequest::new("devstral", vec![]);
        req.context_window = Some(32768);
        let body = p.request_body(&req);
        assert_eq!(body["options"]["num_ctx"], 32768);
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn parse_completion_response() {
        let raw = r#"{
            "model": "devstral",
            "choices": [{"message": {"role": "assistant", "content": "{\"actions\": []}"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let api: ApiResponse = serde_json::from_str(raw).unwrap();
        let resp = api.into_provider_response().unwrap();
        assert_eq!(resp.message.content, "{\"actions\": []}");
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
        assert_eq!(resp.model, "devstral");
    }

    #[test]
    fn empty_choices_is_an_error() {
        let api: ApiResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            api.into_provider_response(),
            Err(ProviderError::ApiError { .. })
        ));
    }
}
