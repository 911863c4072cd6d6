use super::sse::{ApiErrorBody, SseDecoder, StreamAssembler};
use super::{
    CompletionRequest, CompletionResponse, CompletionService, ContentBlock, LLMError, StopReason,
    ToolChoice,
};
use crate::config::AnthropicConfig;
use crate::secrets::{scrub_secrets, SecretCache};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    config: AnthropicConfig,
    secret_cache: Arc<SecretCache>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<Value>,
    #[serde(default)]
    stop_reason: Option<StopReason>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig, secret_cache: Arc<SecretCache>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            secret_cache,
            client,
        }
    }

    fn payload(&self, request: &CompletionRequest, stream: bool) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "messages": request.messages,
        });

        if !request.system.is_empty() {
            payload["system"] = json!(request.system);
        }
        if !request.tools.is_empty() {
            payload["tools"] = json!(request.tools);
            payload["tool_choice"] = match &request.tool_choice {
                ToolChoice::Auto => json!({"type": "auto"}),
                ToolChoice::None => json!({"type": "none"}),
                ToolChoice::Tool(name) => json!({"type": "tool", "name": name}),
            };
        }
        if stream {
            payload["stream"] = json!(true);
        }
        payload
    }

    async fn send(&self, payload: &Value) -> super::Result<reqwest::Response> {
        let api_key = self
            .secret_cache
            .get_secret(&self.config.api_key_secret)
            .map_err(|e| LLMError::AuthenticationFailed(e.to_string()))?;

        let url = format!("{}/messages", self.config.base_url.trim_end_matches('/'));

        tracing::debug!(
            "Anthropic request: model={}, messages={}",
            self.config.model,
            payload["messages"].as_array().map_or(0, Vec::len)
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key.expose())
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else if e.is_connect() {
                    LLMError::ProviderUnavailable(format!(
                        "Cannot connect to {}",
                        self.config.base_url
                    ))
                } else {
                    LLMError::NetworkError(scrub_secrets(&e.to_string()))
                }
            })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .unwrap_or(body);
        let message = scrub_secrets(&message);

        tracing::warn!("Anthropic returned {}: {}", status, message);

        Err(match status.as_u16() {
            401 | 403 => LLMError::AuthenticationFailed(message),
            429 => LLMError::RateLimitExceeded,
            500..=599 => LLMError::ProviderUnavailable(format!("{}: {}", status, message)),
            _ => LLMError::InvalidRequest(message),
        })
    }
}

#[async_trait]
impl CompletionService for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> super::Result<CompletionResponse> {
        let payload = self.payload(request, false);
        let response = self.send(&payload).await?;

        let data: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        // Block kinds we do not model (e.g. thinking) are dropped
        let content = data
            .content
            .into_iter()
            .filter_map(|block| serde_json::from_value::<ContentBlock>(block).ok())
            .collect();

        Ok(CompletionResponse {
            content,
            stop_reason: data.stop_reason.unwrap_or_default(),
        })
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        deltas: mpsc::Sender<String>,
    ) -> super::Result<CompletionResponse> {
        let payload = self.payload(request, true);
        let response = self.send(&payload).await?;

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut assembler = StreamAssembler::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| LLMError::NetworkError(scrub_secrets(&e.to_string())))?;
            for event in decoder.push(&chunk) {
                if let Some(text) = assembler.apply(&event)? {
                    if deltas.send(text).await.is_err() {
                        tracing::debug!("Stream receiver dropped, aborting request");
                        return Err(LLMError::Cancelled);
                    }
                }
            }
        }
        if let Some(event) = decoder.finish() {
            if let Some(text) = assembler.apply(&event)? {
                deltas.send(text).await.map_err(|_| LLMError::Cancelled)?;
            }
        }

        assembler.finish()
    }
}
