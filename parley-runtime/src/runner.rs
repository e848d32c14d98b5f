//! Runner - executes one conversation turn against an agent
//!
//! The runner loads the session, renders the agent's instruction from the
//! session state, sends instruction + history + the new turn to the provider
//! and re-exposes the provider's text deltas as response events. Each event
//! carries the reply accumulated so far, so the last text event is the full
//! reply.
//!
//! History is only committed once the provider stream has completed without
//! error. A failed attempt leaves the session untouched, so a retried turn is
//! never recorded twice.

use crate::agent::AgentDefinition;
use crate::error::{self, Result};
use crate::event::{EventStream, FinishReason, ResponseEvent};
use crate::provider::{CompletionRequest, LlmProvider, StreamChunk};
use crate::session::{SessionContext, SessionStore};
use crate::turn::ConversationTurn;
use futures_util::StreamExt;
use std::sync::Arc;

/// The call shape the dispatcher depends on: one turn in, a stream of events out
#[allow(async_fn_in_trait)]
pub trait AgentRuntime {
    async fn run(&self, ctx: &SessionContext, turn: &ConversationTurn) -> Result<EventStream>;
}

pub struct Runner<P> {
    agent: AgentDefinition,
    app_name: String,
    sessions: Arc<SessionStore>,
    provider: P,
}

impl<P: LlmProvider> Runner<P> {
    pub fn new(
        agent: AgentDefinition,
        app_name: impl Into<String>,
        sessions: Arc<SessionStore>,
        provider: P,
    ) -> Self {
        Self {
            agent,
            app_name: app_name.into(),
            sessions,
            provider,
        }
    }

    pub fn agent(&self) -> &AgentDefinition {
        &self.agent
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    fn build_request(&self, ctx: &SessionContext, turn: &ConversationTurn) -> Result<CompletionRequest> {
        let session = self
            .sessions
            .get_session(&self.app_name, &ctx.user_id, &ctx.session_id)
            .map_err(|e| e.with_operation("runner::run"))?;

        let mut messages = Vec::with_capacity(session.history.len() + 2);
        messages.push(ConversationTurn::system(self.agent.render_instruction(&session.state)));
        messages.extend(session.history.iter().cloned());
        messages.push(turn.clone());

        let mut request = CompletionRequest::new(messages);
        if let Some(model) = &self.agent.model {
            request = request.with_model(model);
        }
        Ok(request)
    }
}

impl<P: LlmProvider> AgentRuntime for Runner<P> {
    async fn run(&self, ctx: &SessionContext, turn: &ConversationTurn) -> Result<EventStream> {
        let request = self.build_request(ctx, turn)?;
        tracing::debug!(
            agent = %self.agent.name,
            provider = self.provider.name(),
            session_id = %ctx.session_id,
            history = request.messages.len() - 2,
            "running turn"
        );

        let mut chunks = self
            .provider
            .stream(request)
            .await
            .map_err(|e| e.with_operation("runner::run"))?;

        let sessions = Arc::clone(&self.sessions);
        let app_name = self.app_name.clone();
        let author = self.agent.name.clone();
        let ctx = ctx.clone();
        let turn = turn.clone();

        let stream = async_stream::stream! {
            let mut reply = String::new();
            let mut finish_reason = FinishReason::Stop;

            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(StreamChunk::Text(delta)) => {
                        reply.push_str(&delta);
                        yield Ok(ResponseEvent::partial(&author, reply.clone()));
                    }
                    Ok(StreamChunk::Done { finish_reason: reason, usage }) => {
                        if let Some(usage) = usage {
                            tracing::debug!(total_tokens = usage.total_tokens, "completion usage");
                        }
                        finish_reason = reason;
                    }
                    Ok(StreamChunk::Error { code, message }) => {
                        yield Err(error::stream_error(code.as_deref(), &message).with_operation("runner::run"));
                        return;
                    }
                    Err(e) => {
                        yield Err(e.with_operation("runner::run"));
                        return;
                    }
                }
            }

            let mut committed = vec![turn];
            if !reply.is_empty() {
                committed.push(ConversationTurn::assistant(reply.clone()));
            }
            if let Err(e) = sessions.append_turns(&app_name, &ctx.user_id, &ctx.session_id, committed) {
                yield Err(e.with_operation("runner::run"));
                return;
            }

            let last = if reply.is_empty() {
                ResponseEvent::empty(&author)
            } else {
                ResponseEvent::text(&author, reply)
            };
            yield Ok(last.with_finish_reason(finish_reason));
        };

        Ok(EventStream::new(stream))
    }
}
