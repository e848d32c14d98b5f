//! Agent definition - who answers and how it is instructed

use crate::session::SessionState;

const QUESTION_ANSWERING_INSTRUCTION: &str = "\
You are a helpful assistant that answers questions about the user's preferences.

Here is some information about the user:
Name: {user_name}
Preferences: {user_preferences}

Answer in a friendly, concise way. If the information above does not cover the
question, say so instead of guessing.";

/// Static description of the agent behind the chat loop
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDefinition {
    /// Display name, also used as the author of response events
    pub name: String,
    /// Model override; the provider's default is used when `None`
    pub model: Option<String>,
    pub description: String,
    /// System instruction; `{key}` placeholders are filled from session state
    pub instruction: String,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: None,
            description: String::new(),
            instruction: instruction.into(),
        }
    }

    /// An agent that answers questions about the user from their profile state
    pub fn question_answering(name: impl Into<String>) -> Self {
        Self::new(name, QUESTION_ANSWERING_INSTRUCTION)
            .with_description("Question answering agent")
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Render the instruction against session state.
    ///
    /// `{key}` is replaced by the state value for `key`: strings with
    /// surrounding whitespace trimmed, other JSON values serialized.
    /// Placeholders with no matching key, and braces that do not enclose an
    /// identifier, are left untouched.
    pub fn render_instruction(&self, state: &SessionState) -> String {
        let template = self.instruction.as_str();
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            let Some(close) = after.find('}') else {
                out.push_str(&rest[open..]);
                return out;
            };

            let key = &after[..close];
            match state.get(key).filter(|_| is_identifier(key)) {
                Some(serde_json::Value::String(s)) => out.push_str(s.trim()),
                Some(value) => out.push_str(&value.to_string()),
                None => {
                    // Not a placeholder we can fill: emit the brace and keep scanning after it
                    out.push('{');
                    rest = after;
                    continue;
                }
            }
            rest = &after[close + 1..];
        }

        out.push_str(rest);
        out
    }
}

fn is_identifier(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
