//! Error kinds for parley operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on `ErrorKind` to decide how to handle specific cases;
/// the retry machinery looks at [`crate::ErrorStatus`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// Invalid argument passed to function
    InvalidArgument,

    // =========================================================================
    // Session errors
    // =========================================================================
    /// No session is registered under the given identifiers
    SessionNotFound,

    /// A session with the same identifiers already exists
    SessionExists,

    // =========================================================================
    // Inference/provider errors
    // =========================================================================
    /// The model call failed for a reason the provider reported
    InferenceFailed,

    /// Provider is overloaded or temporarily unavailable
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    /// Credentials were rejected
    AuthenticationFailed,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// Network error
    NetworkFailed,

    /// IO operation failed
    IoFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,

    /// Serialization/deserialization failed
    SerializationFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Session
            ErrorKind::SessionNotFound => "SessionNotFound",
            ErrorKind::SessionExists => "SessionExists",

            // Inference
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",

            // IO
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::IoFailed => "IoFailed",

            // Parse
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::ProviderUnavailable | ErrorKind::RateLimited | ErrorKind::NetworkFailed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
