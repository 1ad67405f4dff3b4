//! Ollama chat runtime.
//!
//! Talks to a local Ollama server (`POST /api/chat`, non-streaming). Images are
//! sent base64-encoded on the user message, which multimodal models such as
//! LLaVA read alongside the text.

use crate::error::InferenceError;
use crate::traits::{InferenceBackend, InferenceRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub endpoint: String,
    pub model: String,
    /// Upper bound for one HTTP exchange with the runtime.
    pub timeout: Duration,
    /// How long Ollama keeps the model loaded after a call, e.g. `"10m"`.
    pub keep_alive: Option<String>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_OLLAMA_ENDPOINT.to_string(),
            model: "llava:7b".to_string(),
            timeout: Duration::from_secs(300),
            keep_alive: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<&'a str>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

pub struct OllamaRuntime {
    config: OllamaConfig,
    client: Client,
}

impl OllamaRuntime {
    pub fn new(config: OllamaConfig) -> Result<Self, InferenceError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn chat_request<'a>(&'a self, request: &InferenceRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: request.system.clone(),
                images: Vec::new(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
            images: request
                .image
                .iter()
                .map(|image| image.to_base64())
                .collect(),
        });

        ChatRequest {
            model: &self.config.model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: request.sampling.temperature,
                top_p: request.sampling.top_p,
                num_predict: request.max_tokens,
            },
            keep_alive: self.config.keep_alive.as_deref(),
        }
    }
}

#[async_trait]
impl InferenceBackend for OllamaRuntime {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let url = format!("{}/api/chat", self.config.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&self.chat_request(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(InferenceError::Runtime {
                status: status.as_u16(),
                details,
            });
        }

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|error| InferenceError::InvalidResponse(error.to_string()))?;
        debug!(
            model = %self.config.model,
            prompt_tokens = parsed.prompt_eval_count.unwrap_or(0),
            completion_tokens = parsed.eval_count.unwrap_or(0),
            "ollama chat completed"
        );

        parsed
            .message
            .map(|message| message.content)
            .ok_or_else(|| InferenceError::InvalidResponse("response has no message".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImagePayload, Sampling};
    use serde_json::json;

    fn request(image: Option<ImagePayload>) -> InferenceRequest {
        InferenceRequest {
            system: "be brief".to_string(),
            prompt: "what is this?".to_string(),
            image,
            max_tokens: 64,
            sampling: Sampling {
                temperature: 0.25,
                top_p: 0.5,
            },
        }
    }

    #[test]
    fn chat_request_carries_messages_options_and_image() {
        let runtime = OllamaRuntime::new(OllamaConfig {
            model: "llava:13b".to_string(),
            keep_alive: Some("5m".to_string()),
            ..OllamaConfig::default()
        })
        .expect("client should build");

        let body = serde_json::to_value(
            runtime.chat_request(&request(Some(ImagePayload::new(b"hello".to_vec())))),
        )
        .expect("request should serialize");

        assert_eq!(
            body,
            json!({
                "model": "llava:13b",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "what is this?", "images": ["aGVsbG8="]}
                ],
                "stream": false,
                "options": {"temperature": 0.25, "top_p": 0.5, "num_predict": 64},
                "keep_alive": "5m"
            })
        );
    }

    #[test]
    fn text_only_request_omits_images_and_keep_alive() {
        let runtime = OllamaRuntime::new(OllamaConfig::default()).expect("client should build");
        let body = serde_json::to_value(runtime.chat_request(&request(None)))
            .expect("request should serialize");

        assert!(body.pointer("/messages/1/images").is_none());
        assert!(body.get("keep_alive").is_none());
        assert_eq!(body.pointer("/model"), Some(&json!("llava:7b")));
    }

    #[test]
    fn chat_response_parses_message_content() {
        let parsed: ChatResponse = serde_json::from_value(json!({
            "model": "llava:7b",
            "message": {"role": "assistant", "content": "A cat [1]."},
            "done": true,
            "eval_count": 7
        }))
        .expect("response should parse");

        assert_eq!(parsed.message.map(|message| message.content).as_deref(), Some("A cat [1]."));
        assert_eq!(parsed.eval_count, Some(7));
    }
}
