//! Runtime error types
//!
//! Re-exports parley-error and provides runtime-specific conveniences.

pub use parley_error::{Error, ErrorKind, ErrorStatus, Result};

// =============================================================================
// Runtime-specific error constructors
// =============================================================================

/// Map a non-success HTTP response from a provider to an error.
///
/// The numeric status is always part of the message, so callers that only
/// see the text description can still recognise e.g. a 503.
pub fn api_error(status: u16, body: &str) -> Error {
    let message = format!("API error ({}): {}", status, body.trim());
    let err = match status {
        401 | 403 => Error::new(ErrorKind::AuthenticationFailed, message),
        429 => Error::new(ErrorKind::RateLimited, message),
        502..=504 => Error::provider_unavailable(message),
        _ => Error::inference_failed(message),
    };
    err.with_context("status", status.to_string())
}

/// Map a failure reported inside a response stream to an error.
///
/// A numeric code is treated like an HTTP status. Otherwise the code and
/// message text decide between ProviderUnavailable and InferenceFailed. The
/// server's message is always kept.
pub fn stream_error(code: Option<&str>, message: &str) -> Error {
    if let Some(status) = code.and_then(|c| c.parse::<u16>().ok()) {
        return api_error(status, message);
    }

    let text = format!("API error: {}", message.trim());
    let overloaded = [code.unwrap_or_default(), message]
        .iter()
        .any(|s| s.to_lowercase().contains("overloaded"));
    let err = if overloaded {
        Error::provider_unavailable(text)
    } else {
        Error::inference_failed(text)
    };
    match code {
        Some(code) => err.with_context("code", code),
        None => err,
    }
}

/// Create a NetworkFailed error from a transport failure
pub fn network_failed(source: reqwest::Error) -> Error {
    Error::network_failed(source.to_string()).set_source(source)
}

/// Create a ConfigInvalid error for a bad provider setting
pub fn provider_config_invalid(field: &'static str, reason: impl Into<String>) -> Error {
    Error::config_invalid(reason).with_context("field", field)
}

/// Create an Unexpected error for a poisoned lock
pub fn lock_poisoned(what: &'static str) -> Error {
    Error::unexpected(format!("{} lock poisoned", what))
}
