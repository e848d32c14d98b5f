//! # LLM Provider Interface
//!
//! A trait-based abstraction for streaming chat completions from an LLM backend.
//!
//! ## Design
//! - `LlmProvider` trait defines the core interface
//! - `OpenAIProvider` speaks the OpenAI-compatible chat-completions protocol,
//!   which also covers local servers (Ollama, vLLM, bridges)
//! - Streaming via boxed `futures` streams of `StreamChunk`

pub mod openai;
pub mod sse;

pub use openai::OpenAIProvider;
pub use sse::SseParser;

use crate::error::Result;
use crate::event::FinishReason;
use crate::turn::ConversationTurn;
use std::collections::HashMap;
use std::pin::Pin;

// ============================================================================
// Core Types
// ============================================================================

/// Request parameters for a completion
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ConversationTurn>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ConversationTurn>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = Some(max);
        self
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// A streaming chunk from the model
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Text content delta
    Text(String),
    /// Stream finished
    Done {
        finish_reason: FinishReason,
        usage: Option<Usage>,
    },
    /// The server reported a failure inside the stream; nothing follows it
    Error {
        code: Option<String>,
        message: String,
    },
}

/// Boxed stream of chunks; an `Err` item ends the reply
pub type ChunkStream = Pin<Box<dyn futures_core::Stream<Item = Result<StreamChunk>> + Send>>;

// ============================================================================
// Provider Trait
// ============================================================================

/// The main LLM provider trait
#[allow(async_fn_in_trait)]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai")
    fn name(&self) -> &str;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Send a completion request and stream the response
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream>;
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Configuration for creating providers
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    /// Sampling temperature used when a request does not set one
    pub temperature: Option<f32>,
    pub headers: HashMap<String, String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAI,
    Local,
}

impl ProviderConfig {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::OpenAI,
            api_key: Some(api_key.into()),
            base_url: Some("https://api.openai.com/v1".into()),
            default_model: Some("gpt-4o-mini".into()),
            temperature: None,
            headers: HashMap::new(),
            timeout_secs: Some(120),
        }
    }

    /// Any OpenAI-compatible server that needs no key (Ollama, vLLM, ...)
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::Local,
            api_key: None,
            base_url: Some(base_url.into()),
            default_model: Some(model.into()),
            temperature: None,
            headers: HashMap::new(),
            timeout_secs: Some(300),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
