//! Retrying request dispatcher

use crate::classify::{FailureClass, FailureClassifier, SubstringClassifier};
use crate::retry::RetryPolicy;
use parley_runtime::{AgentRuntime, ConversationTurn, Result, SessionContext};
use std::time::Duration;

/// Outcome of dispatching one turn.
///
/// Every path through the dispatcher ends in one of these; failures are
/// values, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentResponse {
    /// The reply, trimmed and non-empty
    Text(String),
    /// The exchange succeeded but no event carried text
    Empty,
    /// Still transiently failing after the last allowed attempt
    Overloaded,
    /// A non-transient failure, with its description
    Failed(String),
}

/// Emitted right before the dispatcher sleeps ahead of a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryNotice {
    /// 0-based index of the attempt that just failed
    pub attempt: u32,
    pub delay: Duration,
}

type Notifier = Box<dyn Fn(&RetryNotice) + Send + Sync>;

pub struct Dispatcher<C = SubstringClassifier> {
    policy: RetryPolicy,
    classifier: C,
    notifier: Option<Notifier>,
}

impl Dispatcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            classifier: SubstringClassifier,
            notifier: None,
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl<C: FailureClassifier> Dispatcher<C> {
    /// Swap the failure classifier
    pub fn with_classifier<D: FailureClassifier>(self, classifier: D) -> Dispatcher<D> {
        Dispatcher {
            policy: self.policy,
            classifier,
            notifier: self.notifier,
        }
    }

    /// Register a callback invoked before every backoff wait
    pub fn on_retry(mut self, notifier: impl Fn(&RetryNotice) + Send + Sync + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `turn` and reduce the outcome to an [`AgentResponse`].
    ///
    /// The exchange is attempted at most `max_retries` times, always with the
    /// same turn. Each attempt drains its whole event stream before the
    /// result is looked at.
    pub async fn dispatch<R: AgentRuntime>(
        &self,
        runtime: &R,
        ctx: &SessionContext,
        turn: &ConversationTurn,
    ) -> AgentResponse {
        let mut attempt = 0;

        loop {
            tracing::debug!(attempt, session_id = %ctx.session_id, "dispatching turn");

            let err = match exchange(runtime, ctx, turn).await {
                Ok(text) => {
                    return match text.as_deref().map(str::trim) {
                        Some(text) if !text.is_empty() => AgentResponse::Text(text.to_string()),
                        _ => AgentResponse::Empty,
                    };
                }
                Err(err) => err,
            };

            match self.classifier.classify(&err) {
                FailureClass::Transient if self.policy.should_retry(attempt) => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(attempt, delay_secs = delay.as_secs_f64(), error = %err, "transient failure, backing off");

                    if let Some(notify) = &self.notifier {
                        notify(&RetryNotice { attempt, delay });
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                FailureClass::Transient => {
                    let err = err.persist();
                    tracing::warn!(attempts = attempt + 1, error = %err, "giving up on transient failure");
                    return AgentResponse::Overloaded;
                }
                FailureClass::Permanent => {
                    tracing::error!(attempt, error = %err, "exchange failed");
                    return AgentResponse::Failed(err.message().to_string());
                }
            }
        }
    }
}

/// One attempt: run the turn and drain the reply
async fn exchange<R: AgentRuntime>(
    runtime: &R,
    ctx: &SessionContext,
    turn: &ConversationTurn,
) -> Result<Option<String>> {
    runtime.run(ctx, turn).await?.last_text().await
}

/// Dispatch with the default classifier and backoff unit.
///
/// A `max_retries` of 0 is a configuration error and is reported as
/// [`AgentResponse::Failed`] without contacting the runtime.
pub async fn dispatch<R: AgentRuntime>(
    runtime: &R,
    ctx: &SessionContext,
    turn: &ConversationTurn,
    max_retries: u32,
) -> AgentResponse {
    match RetryPolicy::new(max_retries) {
        Ok(policy) => Dispatcher::new(policy).dispatch(runtime, ctx, turn).await,
        Err(err) => AgentResponse::Failed(err.message().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::StatusClassifier;
    use parley_runtime::{Error, ErrorKind, EventStream, ResponseEvent};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    enum Outcome {
        /// The call itself fails
        Fail(&'static str),
        /// The call succeeds, the stream fails after some events
        FailMidStream(Vec<ResponseEvent>, &'static str),
        /// The call succeeds with these events
        Events(Vec<ResponseEvent>),
        /// The call fails with a retryable kind and no overload wording
        RateLimited,
    }

    #[derive(Default)]
    struct ScriptedRuntime {
        outcomes: Mutex<VecDeque<Outcome>>,
        turns: Mutex<Vec<ConversationTurn>>,
        drained: Arc<Mutex<usize>>,
    }

    impl ScriptedRuntime {
        fn new(outcomes: Vec<Outcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.turns.lock().unwrap().len()
        }
    }

    impl AgentRuntime for ScriptedRuntime {
        async fn run(&self, _ctx: &SessionContext, turn: &ConversationTurn) -> Result<EventStream> {
            self.turns.lock().unwrap().push(turn.clone());
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("runtime called more often than scripted");

            let drained = Arc::clone(&self.drained);
            let counted = move |item: Result<ResponseEvent>| {
                *drained.lock().unwrap() += 1;
                item
            };

            match outcome {
                Outcome::Fail(message) => Err(Error::unexpected(message)),
                Outcome::RateLimited => Err(Error::new(ErrorKind::RateLimited, "API error (429): slow down")),
                Outcome::FailMidStream(events, message) => {
                    let mut items: Vec<Result<ResponseEvent>> = events.into_iter().map(Ok).collect();
                    items.push(Err(Error::unexpected(message)));
                    Ok(EventStream::from_events(items.into_iter().map(counted)))
                }
                Outcome::Events(events) => Ok(EventStream::from_events(
                    events.into_iter().map(Ok).map(counted),
                )),
            }
        }
    }

    fn ctx() -> SessionContext {
        SessionContext::new("ada", "s1")
    }

    fn reply(text: &str) -> Outcome {
        Outcome::Events(vec![ResponseEvent::text("bot", text)])
    }

    fn recording_dispatcher(policy: RetryPolicy) -> (Dispatcher, Arc<Mutex<Vec<RetryNotice>>>) {
        let notices = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notices);
        let dispatcher = Dispatcher::new(policy).on_retry(move |notice| {
            sink.lock().unwrap().push(*notice);
        });
        (dispatcher, notices)
    }

    fn delays(notices: &Mutex<Vec<RetryNotice>>) -> Vec<Duration> {
        notices.lock().unwrap().iter().map(|n| n.delay).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_exhaust_bound() {
        for n in 2..=5u32 {
            let runtime = ScriptedRuntime::new((0..n).map(|_| Outcome::Fail("503 Service Unavailable")).collect());
            let (dispatcher, notices) = recording_dispatcher(RetryPolicy::new(n).unwrap());

            let start = Instant::now();
            let response = dispatcher.dispatch(&runtime, &ctx(), &ConversationTurn::user("hi")).await;

            assert_eq!(response, AgentResponse::Overloaded);
            assert_eq!(runtime.calls(), n as usize);

            let expected: Vec<Duration> = (1..n).map(|k| Duration::from_secs(2 * k as u64)).collect();
            assert_eq!(delays(&notices), expected);
            assert_eq!(start.elapsed(), expected.iter().sum::<Duration>());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_bound_never_waits() {
        let runtime = ScriptedRuntime::new(vec![Outcome::Fail("model overloaded")]);
        let (dispatcher, notices) = recording_dispatcher(RetryPolicy::new(1).unwrap());

        let start = Instant::now();
        let response = dispatcher.dispatch(&runtime, &ctx(), &ConversationTurn::user("hi")).await;

        assert_eq!(response, AgentResponse::Overloaded);
        assert_eq!(runtime.calls(), 1);
        assert!(notices.lock().unwrap().is_empty());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        for max_retries in [1, 3, 10] {
            let runtime = ScriptedRuntime::new(vec![Outcome::Fail("401 Unauthorized: bad key")]);
            let (dispatcher, notices) = recording_dispatcher(RetryPolicy::new(max_retries).unwrap());

            let response = dispatcher.dispatch(&runtime, &ctx(), &ConversationTurn::user("hi")).await;

            assert_eq!(response, AgentResponse::Failed("401 Unauthorized: bad key".into()));
            assert_eq!(runtime.calls(), 1);
            assert!(notices.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_last_text_event_is_the_reply() {
        let runtime = ScriptedRuntime::new(vec![Outcome::Events(vec![
            ResponseEvent::text("bot", ""),
            ResponseEvent::partial("bot", "partial"),
            ResponseEvent::text("bot", "final"),
        ])]);

        let response = Dispatcher::default().dispatch(&runtime, &ctx(), &ConversationTurn::user("hi")).await;
        assert_eq!(response, AgentResponse::Text("final".into()));
        assert_eq!(*runtime.drained.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_reply_is_trimmed() {
        let runtime = ScriptedRuntime::new(vec![reply("\n  Hi there!  \n")]);
        let response = Dispatcher::default().dispatch(&runtime, &ctx(), &ConversationTurn::user("hi")).await;
        assert_eq!(response, AgentResponse::Text("Hi there!".into()));
    }

    #[tokio::test]
    async fn test_no_text_is_empty_not_failure() {
        let runtime = ScriptedRuntime::new(vec![Outcome::Events(vec![
            ResponseEvent::empty("bot"),
            ResponseEvent::text("bot", ""),
        ])]);

        let response = Dispatcher::default().dispatch(&runtime, &ctx(), &ConversationTurn::user("hi")).await;
        assert_eq!(response, AgentResponse::Empty);
        assert_eq!(runtime.calls(), 1);
    }

    #[tokio::test]
    async fn test_whitespace_only_reply_is_empty() {
        let runtime = ScriptedRuntime::new(vec![reply("   \n")]);
        let response = Dispatcher::default().dispatch(&runtime, &ctx(), &ConversationTurn::user("hi")).await;
        assert_eq!(response, AgentResponse::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_stream_overload_is_retried() {
        let runtime = ScriptedRuntime::new(vec![
            Outcome::FailMidStream(
                vec![ResponseEvent::partial("bot", "Hel")],
                "API error (503): upstream overloaded",
            ),
            reply("Hello"),
        ]);
        let (dispatcher, notices) = recording_dispatcher(RetryPolicy::default());

        let response = dispatcher.dispatch(&runtime, &ctx(), &ConversationTurn::user("hi")).await;

        assert_eq!(response, AgentResponse::Text("Hello".into()));
        assert_eq!(runtime.calls(), 2);
        assert_eq!(delays(&notices), vec![Duration::from_secs(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_two_overloads() {
        let runtime = ScriptedRuntime::new(vec![
            Outcome::Fail("503 Service Unavailable"),
            Outcome::Fail("503 Service Unavailable"),
            reply("Hi there"),
        ]);
        let (dispatcher, notices) = recording_dispatcher(RetryPolicy::default());
        let turn = ConversationTurn::user("hello");

        let start = Instant::now();
        let response = dispatcher.dispatch(&runtime, &ctx(), &turn).await;

        assert_eq!(response, AgentResponse::Text("Hi there".into()));
        assert_eq!(delays(&notices), vec![Duration::from_secs(2), Duration::from_secs(4)]);
        assert_eq!(
            notices.lock().unwrap().iter().map(|n| n.attempt).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(start.elapsed(), Duration::from_secs(6));

        // every attempt saw the identical, unmodified turn
        let turns = runtime.turns.lock().unwrap();
        assert_eq!(turns.len(), 3);
        assert!(turns.iter().all(|t| *t == ConversationTurn::user("hello")));
        assert_eq!(turn, ConversationTurn::user("hello"));
    }

    #[tokio::test]
    async fn test_resend_after_permanent_failure_keeps_turn() {
        let runtime = ScriptedRuntime::new(vec![Outcome::Fail("bad request"), reply("ok")]);
        let dispatcher = Dispatcher::default();
        let turn = ConversationTurn::user("same words");

        let first = dispatcher.dispatch(&runtime, &ctx(), &turn).await;
        let second = dispatcher.dispatch(&runtime, &ctx(), &turn).await;

        assert_eq!(first, AgentResponse::Failed("bad request".into()));
        assert_eq!(second, AgentResponse::Text("ok".into()));
        let turns = runtime.turns.lock().unwrap();
        assert_eq!(turns[0], turns[1]);
        assert_eq!(turns[1].text(), "same words");
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_classifier() {
        let runtime = ScriptedRuntime::new(vec![Outcome::Fail("rate limited"), reply("done")]);
        let dispatcher = Dispatcher::new(RetryPolicy::new(2).unwrap()).with_classifier(|err: &Error| {
            if err.message().contains("rate limited") {
                FailureClass::Transient
            } else {
                FailureClass::Permanent
            }
        });

        let response = dispatcher.dispatch(&runtime, &ctx(), &ConversationTurn::user("hi")).await;
        assert_eq!(response, AgentResponse::Text("done".into()));
        assert_eq!(runtime.calls(), 2);
    }

    #[tokio::test]
    async fn test_free_dispatch_rejects_zero_bound() {
        let runtime = ScriptedRuntime::new(vec![]);
        let response = dispatch(&runtime, &ctx(), &ConversationTurn::user("hi"), 0).await;

        assert!(matches!(response, AgentResponse::Failed(ref m) if m.contains("max_retries")));
        assert_eq!(runtime.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_dispatch_uses_substring_classifier() {
        let runtime = ScriptedRuntime::new(vec![
            Outcome::Fail("Model is Overloaded"),
            reply("back"),
        ]);
        let response = dispatch(&runtime, &ctx(), &ConversationTurn::user("hi"), 3).await;
        assert_eq!(response, AgentResponse::Text("back".into()));
        assert_eq!(runtime.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_classifier_retries_by_kind() {
        let runtime = ScriptedRuntime::new(vec![Outcome::RateLimited, reply("ok")]);

        let dispatcher = Dispatcher::default().with_classifier(StatusClassifier);
        let response = dispatcher.dispatch(&runtime, &ctx(), &ConversationTurn::user("hi")).await;

        assert_eq!(response, AgentResponse::Text("ok".into()));
        assert_eq!(runtime.calls(), 2);
    }
}
