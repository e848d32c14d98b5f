//! Failure classification

use parley_runtime::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Expected to clear up on retry (e.g. upstream overload)
    Transient,
    Permanent,
}

/// Decides whether a failed exchange is worth retrying.
///
/// Any `Fn(&Error) -> FailureClass` closure is a classifier too.
pub trait FailureClassifier {
    fn classify(&self, error: &Error) -> FailureClass;
}

impl<F> FailureClassifier for F
where
    F: Fn(&Error) -> FailureClass,
{
    fn classify(&self, error: &Error) -> FailureClass {
        self(error)
    }
}

/// Treats a failure as transient when its description mentions `503` or
/// `overloaded`, ignoring case.
///
/// Only the text is consulted; kind and status are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringClassifier;

impl SubstringClassifier {
    const MARKERS: [&'static str; 2] = ["503", "overloaded"];
}

impl FailureClassifier for SubstringClassifier {
    fn classify(&self, error: &Error) -> FailureClass {
        let description = error.message().to_lowercase();
        if Self::MARKERS.iter().any(|marker| description.contains(marker)) {
            FailureClass::Transient
        } else {
            FailureClass::Permanent
        }
    }
}

/// Classifies by the error's own retry status
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusClassifier;

impl FailureClassifier for StatusClassifier {
    fn classify(&self, error: &Error) -> FailureClass {
        if error.is_retryable() {
            FailureClass::Transient
        } else {
            FailureClass::Permanent
        }
    }
}
