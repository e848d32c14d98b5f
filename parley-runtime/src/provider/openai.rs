//! OpenAI-compatible provider implementation
//!
//! Works with OpenAI, Azure OpenAI, vLLM, Ollama, and other OpenAI-compatible APIs.

use super::*;
use crate::error;
use reqwest::Client;
use serde::Serialize;

/// OpenAI-compatible provider
pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.unwrap_or(120)))
            .build()
            .map_err(|e| {
                error::provider_config_invalid("timeout_secs", e.to_string())
                    .with_operation("openai::new")
                    .set_source(e)
            })?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/')
    }

    fn build_request(&self, request: CompletionRequest) -> ApiRequest {
        let model = request
            .model
            .unwrap_or_else(|| self.default_model().to_string());

        ApiRequest {
            model,
            messages: request.messages.iter().map(ApiMessage::from).collect(),
            temperature: request.temperature.or(self.config.temperature),
            max_tokens: request.max_tokens,
            stream: true,
        }
    }
}

impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or("gpt-4o-mini")
    }

    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        let api_request = self.build_request(request);
        let model = api_request.model.clone();

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url()))
            .json(&api_request);

        if let Some(api_key) = &self.config.api_key {
            if !api_key.is_empty() {
                req = req.bearer_auth(api_key);
            }
        }

        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        tracing::debug!(%model, messages = api_request.messages.len(), "sending completion request");

        let response = req.send().await.map_err(|e| {
            error::network_failed(e)
                .with_operation("openai::stream")
                .with_context("model", model.clone())
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(error::api_error(status, &text)
                .with_operation("openai::stream")
                .with_context("model", model));
        }

        // Create async stream from SSE response
        let stream = async_stream::stream! {
            use futures_util::StreamExt;

            let mut byte_stream = response.bytes_stream();
            let mut parser = SseParser::new();

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(bytes) => {
                        for chunk in parser.feed(&bytes) {
                            if let StreamChunk::Error { code, message } = &chunk {
                                yield Err(error::stream_error(code.as_deref(), message)
                                    .with_operation("openai::stream"));
                                return;
                            }
                            yield Ok(chunk);
                        }
                        if parser.is_finished() {
                            return;
                        }
                    }
                    Err(e) => {
                        yield Err(error::network_failed(e).with_operation("openai::stream"));
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

impl From<&ConversationTurn> for ApiMessage {
    fn from(turn: &ConversationTurn) -> Self {
        Self {
            role: turn.role().as_str(),
            content: turn.text().to_string(),
        }
    }
}
