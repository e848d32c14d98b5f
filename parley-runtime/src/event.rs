//! # Response Events
//!
//! A reply arrives as a finite, non-restartable stream of events. Only some
//! events carry text, and a later text event supersedes an earlier one, so the
//! reply is whatever the *last* text-bearing event says once the stream has
//! been drained.

use crate::error::Result;
use futures_core::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use std::task::{Context, Poll};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

impl FinishReason {
    pub fn from_api(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        }
    }
}

/// One unit of a streamed reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEvent {
    /// Name of the agent that produced the event
    pub author: String,
    /// Reply text carried by this event, if any
    pub text: Option<String>,
    /// More events refining this text are expected
    pub partial: bool,
    /// Set on the event that closes the reply
    pub finish_reason: Option<FinishReason>,
}

impl ResponseEvent {
    /// An event that carries no text
    pub fn empty(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: None,
            partial: false,
            finish_reason: None,
        }
    }

    /// A complete text event
    pub fn text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::empty(author)
        }
    }

    /// A text event that later events will refine
    pub fn partial(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            partial: true,
            ..Self::text(author, text)
        }
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    /// The event's text, if it carries any non-empty text
    pub fn text_fragment(&self) -> Option<&str> {
        self.text.as_deref().filter(|text| !text.is_empty())
    }
}

/// Stream of reply events from one exchange.
///
/// An `Err` item means the exchange failed part-way through.
pub struct EventStream {
    inner: Pin<Box<dyn Stream<Item = Result<ResponseEvent>> + Send>>,
}

impl EventStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<ResponseEvent>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Build a stream that replays a fixed list of items
    pub fn from_events<I>(events: I) -> Self
    where
        I: IntoIterator<Item = Result<ResponseEvent>>,
        I::IntoIter: Send + 'static,
    {
        Self::new(futures_util::stream::iter(events))
    }

    /// Drain the stream and return the last non-empty text it carried.
    ///
    /// The whole stream is consumed even after text has been seen, since a
    /// later event may replace it. The first failed item aborts the drain.
    pub async fn last_text(mut self) -> Result<Option<String>> {
        let mut last = None;
        while let Some(event) = self.inner.next().await {
            let event = event?;
            if let Some(text) = event.text_fragment() {
                last = Some(text.to_string());
            }
        }
        Ok(last)
    }
}

impl Stream for EventStream {
    type Item = Result<ResponseEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}
