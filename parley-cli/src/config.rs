//! Configuration loading for the chat binary.
//!
//! Every section is optional; command-line flags override file values.

use anyhow::{bail, Context};
use parley_agent::{RetryPolicy, DEFAULT_MAX_RETRIES};
use parley_runtime::{ProviderConfig, SessionState};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub app: AppConfig,
    pub provider: ProviderSection,
    pub retry: RetryConfig,
    /// Initial session state, rendered into the agent's instruction
    pub profile: SessionState,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name, also used as the bot's display name
    pub name: String,
    pub user_id: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Parley Bot".to_string(),
            user_id: "parley_user".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    /// OpenAI-compatible endpoint; defaults to OpenAI itself
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 120,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_secs: 2,
        }
    }
}

const DEFAULT_USER_NAME: &str = "Guest";
const DEFAULT_USER_PREFERENCES: &str = "The user has not shared any preferences yet.";

/// Values taken from the command line
#[derive(Debug, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub max_retries: Option<u32>,
}

impl ChatConfig {
    /// Load from `path`, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(model) = overrides.model {
            self.provider.model = model;
        }
        if let Some(base_url) = overrides.base_url {
            self.provider.base_url = Some(base_url);
        }
        if let Some(api_key) = overrides.api_key.filter(|key| !key.trim().is_empty()) {
            self.provider.api_key = Some(api_key);
        }
        if let Some(max_retries) = overrides.max_retries {
            self.retry.max_retries = max_retries;
        }
    }

    /// Provider settings.
    ///
    /// With a key this targets OpenAI (or `base_url` when set). Without one
    /// a `base_url` is required and treated as a keyless local server.
    pub fn provider_config(&self) -> anyhow::Result<ProviderConfig> {
        let section = &self.provider;
        let config = match (&section.api_key, &section.base_url) {
            (Some(key), Some(url)) => ProviderConfig::openai(key).with_base_url(url),
            (Some(key), None) => ProviderConfig::openai(key),
            (None, Some(url)) => ProviderConfig::local(url, &section.model),
            (None, None) => bail!(
                "no API key configured: set OPENAI_API_KEY, pass --api-key, or point --base-url at a local server"
            ),
        };

        let mut config = config
            .with_model(&section.model)
            .with_timeout(section.timeout_secs);
        if let Some(temperature) = section.temperature {
            config = config.with_temperature(temperature);
        }
        Ok(config)
    }

    /// Initial session state: the `[profile]` table over the keys the
    /// question-answering instruction needs.
    pub fn session_state(&self) -> SessionState {
        let mut state = SessionState::new();
        state.insert("user_name".into(), DEFAULT_USER_NAME.into());
        state.insert("user_preferences".into(), DEFAULT_USER_PREFERENCES.into());
        state.extend(self.profile.clone());
        state
    }

    pub fn retry_policy(&self) -> anyhow::Result<RetryPolicy> {
        let policy = RetryPolicy::new(self.retry.max_retries)?;
        Ok(policy.with_backoff_unit(Duration::from_secs(self.retry.backoff_secs)))
    }
}
