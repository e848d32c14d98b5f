//! The main Error type for parley

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// The unified error type for all parley operations.
///
/// This error type provides:
/// - `kind`: What type of error occurred
/// - `message`: Human-readable description
/// - `status`: Whether the error is retryable
/// - `operation`: What operation caused the error
/// - `context`: Key-value pairs for debugging
/// - `source`: The underlying error (if any)
///
/// # Example
///
/// ```rust
/// use parley_error::{Error, ErrorKind, ErrorStatus};
///
/// let err = Error::new(ErrorKind::ProviderUnavailable, "API error (503): model overloaded")
///     .with_operation("openai::stream")
///     .with_context("model", "gpt-4o-mini")
///     .with_context("attempt", "1");
///
/// assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
/// assert_eq!(err.status(), ErrorStatus::Temporary);
/// assert!(err.is_retryable());
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_retryable() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };

        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message.
    ///
    /// This is the plain-text failure description shown to users and matched
    /// by text-based failure classifiers.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error status
    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    /// Get the operation that caused this error
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Get the context key-value pairs
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Get the source error (if any)
    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    // =========================================================================
    // Builders (chainable)
    // =========================================================================

    /// Set the error status
    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark as temporary (retryable)
    pub fn temporary(mut self) -> Self {
        self.status = ErrorStatus::Temporary;
        self
    }

    /// Mark as permanent (not retryable)
    pub fn permanent(mut self) -> Self {
        self.status = ErrorStatus::Permanent;
        self
    }

    /// Set the operation that caused this error.
    ///
    /// If an operation was already set, the previous one is moved to context
    /// as "called" to preserve the call chain.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set the source error.
    ///
    /// # Panics (debug only)
    /// Panics in debug mode if source was already set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    // =========================================================================
    // Status mutations
    // =========================================================================

    /// Mark as persistent after failed retries
    pub fn persist(mut self) -> Self {
        self.status = self.status.persist();
        self
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }
}

// =============================================================================
// Display - compact, single-line format for logs
// =============================================================================

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.status)?;

        if !self.operation.is_empty() {
            write!(f, " at {}", self.operation)?;
        }

        if !self.context.is_empty() {
            write!(f, ", context {{ ")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

// =============================================================================
// Debug - verbose, multi-line format for debugging
// =============================================================================

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.message.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Message: {}", self.message)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "    Source: {:?}", source)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::IoFailed, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

// =============================================================================
// Convenience constructors
// =============================================================================

impl Error {
    /// Create an Unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// Create an Unsupported error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    /// Create a ConfigInvalid error
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Create an InvalidArgument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Create a SessionNotFound error
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self::new(ErrorKind::SessionNotFound, format!("session '{}' not found", session_id))
            .with_context("session_id", session_id)
    }

    /// Create a SessionExists error
    pub fn session_exists(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self::new(ErrorKind::SessionExists, format!("session '{}' already exists", session_id))
            .with_context("session_id", session_id)
    }

    /// Create an InferenceFailed error
    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InferenceFailed, message)
    }

    /// Create a ProviderUnavailable error
    pub fn provider_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProviderUnavailable, message)
    }

    /// Create a NetworkFailed error
    pub fn network_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkFailed, message)
    }

    /// Create a ParseFailed error
    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::new(ErrorKind::SessionNotFound, "session 'abc' not found");
        assert_eq!(err.kind(), ErrorKind::SessionNotFound);
        assert_eq!(err.message(), "session 'abc' not found");
        assert_eq!(err.status(), ErrorStatus::Permanent);
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::new(ErrorKind::InferenceFailed, "bad request")
            .with_operation("openai::stream")
            .with_context("model", "gpt-4o-mini")
            .with_context("status", "400");

        assert_eq!(err.operation(), "openai::stream");
        assert_eq!(err.context().len(), 2);
        assert_eq!(err.context()[0], ("model", "gpt-4o-mini".to_string()));
    }

    #[test]
    fn test_operation_chaining() {
        let err = Error::new(ErrorKind::NetworkFailed, "connection reset")
            .with_operation("openai::stream")
            .with_operation("runner::run");

        assert_eq!(err.operation(), "runner::run");
        assert_eq!(err.context().len(), 1);
        assert_eq!(err.context()[0], ("called", "openai::stream".to_string()));
    }

    #[test]
    fn test_default_status_follows_kind() {
        let err = Error::provider_unavailable("API error (503): overloaded");
        assert!(err.is_retryable());

        let err = Error::inference_failed("API error (400): bad request");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_persist() {
        let err = Error::network_failed("connection refused");
        assert!(err.is_retryable());

        let err = err.persist();
        assert!(!err.is_retryable());
        assert_eq!(err.status(), ErrorStatus::Persistent);
    }

    #[test]
    fn test_display() {
        let err = Error::provider_unavailable("model overloaded")
            .with_operation("openai::stream")
            .with_context("model", "gpt-4o-mini")
            .with_context("status", "503");

        let display = format!("{}", err);
        assert!(display.contains("ProviderUnavailable"));
        assert!(display.contains("temporary"));
        assert!(display.contains("openai::stream"));
        assert!(display.contains("model: gpt-4o-mini"));
        assert!(display.ends_with("=> model overloaded"));
    }

    #[test]
    fn test_display_without_operation() {
        let err = Error::unexpected("boom");
        assert_eq!(err.to_string(), "Unexpected (permanent) => boom");
    }

    #[test]
    fn test_convenience_constructors() {
        let err = Error::session_not_found("a1b2");
        assert_eq!(err.kind(), ErrorKind::SessionNotFound);
        assert!(err.message().contains("a1b2"));
        assert_eq!(err.context()[0], ("session_id", "a1b2".to_string()));

        let err = Error::session_exists("a1b2");
        assert_eq!(err.kind(), ErrorKind::SessionExists);

        let err = Error::config_invalid("max_retries must be at least 1");
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout closed");
        let err: Error = io_err.into();

        assert_eq!(err.kind(), ErrorKind::IoFailed);
        assert_eq!(err.operation(), "io");
        assert!(err.source_ref().is_some());
    }
}
