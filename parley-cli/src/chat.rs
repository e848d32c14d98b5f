//! Interactive chat loop

use parley_agent::{AgentResponse, Dispatcher, RetryNotice, RetryPolicy};
use parley_runtime::{AgentRuntime, ConversationTurn, SessionContext};
use std::future::Future;
use std::io::BufRead;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

const QUIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Quit,
    Blank,
    Message(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if QUIT_WORDS.iter().any(|word| line.eq_ignore_ascii_case(word)) {
        Input::Quit
    } else if line.is_empty() {
        Input::Blank
    } else {
        Input::Message(line.to_string())
    }
}

pub fn render_response(bot: &str, response: &AgentResponse) -> String {
    match response {
        AgentResponse::Text(text) => format!("🤖 {bot}: {text}"),
        AgentResponse::Empty => format!("🤖 {bot}: Sorry, I couldn't process that message."),
        AgentResponse::Overloaded => {
            "⏳ The AI model is currently overloaded. Please try again later.".to_string()
        }
        AgentResponse::Failed(message) => format!("❌ Error: {message}"),
    }
}

pub fn render_notice(notice: &RetryNotice) -> String {
    format!("⏳ Model busy, retrying in {} seconds...", notice.delay.as_secs())
}

/// Read stdin lines on a dedicated thread.
///
/// A blocking read cannot be cancelled, so it must not live on the runtime.
/// The channel closes at end of input.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read from stdin");
                    break;
                }
            }
        }
    });
    rx
}

enum Step {
    Continue,
    Stop,
}

pub struct ChatLoop<R> {
    runtime: R,
    dispatcher: Dispatcher,
    notices: mpsc::UnboundedReceiver<RetryNotice>,
    ctx: SessionContext,
    bot_name: String,
}

impl<R: AgentRuntime> ChatLoop<R> {
    pub fn new(runtime: R, policy: RetryPolicy, ctx: SessionContext, bot_name: impl Into<String>) -> Self {
        let (tx, notices) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(policy).on_retry(move |notice| {
            let _ = tx.send(*notice);
        });

        Self {
            runtime,
            dispatcher,
            notices,
            ctx,
            bot_name: bot_name.into(),
        }
    }

    /// Run until the user quits, input ends or `interrupt` fires.
    ///
    /// `interrupt` is honoured both while waiting for input and while a turn
    /// is being dispatched; an in-flight dispatch is dropped.
    pub async fn run<O, F>(
        &mut self,
        lines: &mut mpsc::Receiver<String>,
        out: &mut O,
        interrupt: F,
    ) -> std::io::Result<()>
    where
        O: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        say(out, &format!("🤖 {} Terminal Chat", self.bot_name)).await?;
        say(out, "Type your messages and press Enter. Type 'quit' or 'exit' to stop.\n").await?;
        say(out, &format!("✅ Session created: {}...\n", self.ctx.short_id())).await?;

        loop {
            out.write_all(b"You: ").await?;
            out.flush().await?;

            let line = tokio::select! {
                line = lines.recv() => line,
                _ = &mut interrupt => None,
            };
            let Some(line) = line else {
                say(out, "\n\n👋 Goodbye!").await?;
                return Ok(());
            };

            match parse_input(&line) {
                Input::Quit => {
                    say(out, "\n👋 Goodbye!").await?;
                    return Ok(());
                }
                Input::Blank => continue,
                Input::Message(text) => {
                    if let Step::Stop = self.exchange(text, out, &mut interrupt).await? {
                        say(out, "\n\n👋 Goodbye!").await?;
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn exchange<O, F>(&mut self, text: String, out: &mut O, interrupt: &mut F) -> std::io::Result<Step>
    where
        O: AsyncWrite + Unpin,
        F: Future<Output = ()> + Unpin,
    {
        let Self {
            runtime,
            dispatcher,
            notices,
            ctx,
            bot_name,
        } = self;

        tracing::debug!(chars = text.len(), "user message");
        say(out, "🤖 Thinking...").await?;

        let turn = ConversationTurn::user(text);
        let dispatch = dispatcher.dispatch(&*runtime, &*ctx, &turn);
        tokio::pin!(dispatch);

        let response = loop {
            tokio::select! {
                biased;
                Some(notice) = notices.recv() => say(out, &render_notice(&notice)).await?,
                response = &mut dispatch => break Some(response),
                _ = &mut *interrupt => break None,
            }
        };

        while let Ok(notice) = notices.try_recv() {
            say(out, &render_notice(&notice)).await?;
        }

        match response {
            Some(response) => {
                say(out, &render_response(bot_name.as_str(), &response)).await?;
                say(out, "").await?;
                Ok(Step::Continue)
            }
            None => Ok(Step::Stop),
        }
    }
}

async fn say<O: AsyncWrite + Unpin>(out: &mut O, line: &str) -> std::io::Result<()> {
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}
