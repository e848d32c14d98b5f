//! # Parley Agent
//!
//! Sends one user turn to the agent runtime and turns whatever happens into
//! an [`AgentResponse`]:
//! 1. The runtime is asked to run the turn and its event stream is drained
//! 2. The last text-bearing event is the reply
//! 3. Failures are classified as transient or permanent
//! 4. Transient failures are retried with linear backoff, up to a fixed bound
//! 5. Everything else is reported back as a value, never as an error

mod classify;
mod dispatcher;
mod retry;

pub use classify::{FailureClass, FailureClassifier, StatusClassifier, SubstringClassifier};
pub use dispatcher::{dispatch, AgentResponse, Dispatcher, RetryNotice};
pub use retry::{RetryPolicy, DEFAULT_BACKOFF_UNIT, DEFAULT_MAX_RETRIES};
