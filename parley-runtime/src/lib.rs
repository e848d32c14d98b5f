//! # Parley Runtime
//!
//! The collaborators the chat dispatcher talks to.
//!
//! ## Core Concepts
//! - **Turns**: Role-tagged text units sent to the model
//! - **Events**: Streamed reply fragments; the last one carrying text is authoritative
//! - **Sessions**: In-memory keyed state plus committed conversation history
//! - **Agent**: Name, model and an instruction template rendered from session state
//! - **Provider**: Trait-based LLM communication (OpenAI-compatible endpoints)
//! - **Runner**: Ties the above together behind the `AgentRuntime` call shape

pub mod agent;
pub mod error;
pub mod event;
pub mod provider;
pub mod runner;
pub mod session;
pub mod turn;

pub use agent::AgentDefinition;
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use event::{EventStream, FinishReason, ResponseEvent};
pub use provider::{
    ChunkStream, CompletionRequest, LlmProvider, OpenAIProvider, ProviderConfig, ProviderType,
    SseParser, StreamChunk, Usage,
};
pub use runner::{AgentRuntime, Runner};
pub use session::{Session, SessionContext, SessionState, SessionStore};
pub use turn::{ConversationTurn, Role};
