//! # Parley CLI
//!
//! Interactive terminal chat with a question-answering agent. Transient model
//! overloads are retried with linear backoff before the user sees an error.
//!
//! Usage:
//!   parley
//!   parley --config parley.toml
//!   parley --base-url http://localhost:11434/v1 --model llama3
//!
//! The API key is read from `--api-key`, `OPENAI_API_KEY` or a `.env` file.

mod chat;
mod config;
mod logging;

use anyhow::Context;
use clap::Parser;
use config::{ChatConfig, Overrides};
use parley_runtime::{AgentDefinition, OpenAIProvider, Runner, SessionStore};
use std::path::PathBuf;
use std::sync::Arc;

const AGENT_NAME: &str = "question_answering_agent";

#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about = "Parley - terminal chat that rides out model overloads")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model to request
    #[arg(long)]
    model: Option<String>,

    /// OpenAI-compatible endpoint
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Attempts per message, the first one included
    #[arg(long)]
    max_retries: Option<u32>,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Blocks until Ctrl-C; never resolves if the handler cannot be installed
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let mut config = ChatConfig::load(cli.config.as_deref())?;
    config.apply(Overrides {
        model: cli.model,
        base_url: cli.base_url,
        api_key: cli.api_key,
        max_retries: cli.max_retries,
    });

    let policy = config.retry_policy()?;
    let provider = OpenAIProvider::new(config.provider_config()?)?;

    let sessions = Arc::new(SessionStore::new());
    let session = sessions
        .create_session(&config.app.name, &config.app.user_id, None, config.session_state())
        .context("failed to create chat session")?;

    let agent = AgentDefinition::question_answering(AGENT_NAME);
    let runner = Runner::new(agent, &config.app.name, Arc::clone(&sessions), provider);

    let mut chat = chat::ChatLoop::new(runner, policy, session.context(), &config.app.name);
    let mut lines = chat::spawn_stdin_reader();
    let mut stdout = tokio::io::stdout();

    chat.run(&mut lines, &mut stdout, ctrl_c()).await?;

    sessions.delete_session(&config.app.name, &config.app.user_id, &session.id)?;
    Ok(())
}
