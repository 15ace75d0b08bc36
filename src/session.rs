//! Stream sessions: the read loop, timeout guard and terminal-state policy.
//!
//! Each session runs in its own tokio task and owns its parsing state
//! exclusively. The caller receives events through a [`SessionHandle`], which
//! is also a [`Stream`] of [`SessionEvent`]s:
//!
//! ```text
//! ContentDelta("Hel") -> ContentDelta("Hello") -> Completed { "Hello", [] }
//! ```
//!
//! The first of stream end, timeout, transport error or cancellation decides
//! how the session ends. Whatever loses the race is dropped, including the
//! body stream, so the underlying connection is released.

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

use crate::error::SessionError;
use crate::http::{body_stream, ByteStream};
use crate::model::{CompletedTurn, RecognizedEvent, SessionEvent, SessionState, ToolInvocation};
use crate::options::StreamOptions;
use crate::pipeline::Pipeline;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// Used when `max_duration` is too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

enum Outcome {
    Finished,
    TimedOut,
    Failed(String),
    Closed,
}

/// One streamed response being consumed.
///
/// Not constructed directly; use [`StreamSession::start`],
/// [`StreamSession::start_response`] or [`StreamSession::start_request`].
/// All of them must be called from within a tokio runtime.
pub struct StreamSession {
    options: StreamOptions,
    pipeline: Pipeline,
    invocations: Vec<ToolInvocation>,
    events: mpsc::Sender<SessionEvent>,
    state: watch::Sender<SessionState>,
}

impl StreamSession {
    /// Start a session over an arbitrary byte stream.
    ///
    /// # Example
    /// ```
    /// use bytes::Bytes;
    /// use chatstream::error::SessionError;
    /// use chatstream::model::SessionEvent;
    /// use chatstream::options::StreamOptions;
    /// use chatstream::session::StreamSession;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let chunks = vec![
    ///     Ok::<_, SessionError>(Bytes::from("data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n")),
    ///     Ok(Bytes::from("data: [DONE]\n")),
    /// ];
    /// let mut handle = StreamSession::start(futures::stream::iter(chunks), StreamOptions::default());
    ///
    /// assert_eq!(handle.next_event().await, Some(SessionEvent::ContentDelta("Hi".to_string())));
    /// assert!(matches!(handle.next_event().await, Some(SessionEvent::Completed(turn)) if turn.content == "Hi"));
    /// # }
    /// ```
    pub fn start<S, E>(body: S, options: StreamOptions) -> SessionHandle
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<SessionError> + Send + 'static,
    {
        let body: ByteStream = Box::pin(body.map(|chunk| chunk.map_err(Into::<SessionError>::into)));
        Self::spawn(async move { Ok(body) }, options)
    }

    /// Start a session over a response the caller already received.
    ///
    /// A non-success status ends the session with `Failed`.
    pub fn start_response(response: reqwest::Response, options: StreamOptions) -> SessionHandle {
        Self::spawn(body_stream(response), options)
    }

    /// Start a session over a request the caller already built and sent.
    ///
    /// The time budget covers waiting for the response headers, and
    /// cancelling the session aborts the request.
    ///
    /// # Example
    /// ```ignore
    /// let pending = client
    ///     .post(url)
    ///     .bearer_auth(token)
    ///     .json(&body)
    ///     .send();
    /// let handle = StreamSession::start_request(pending, StreamOptions::default());
    /// ```
    pub fn start_request<F>(pending: F, options: StreamOptions) -> SessionHandle
    where
        F: Future<Output = Result<reqwest::Response, reqwest::Error>> + Send + 'static,
    {
        Self::spawn(
            async move {
                let response = pending.await?;
                body_stream(response).await
            },
            options,
        )
    }

    fn spawn<F>(source: F, options: StreamOptions) -> SessionHandle
    where
        F: Future<Output = Result<ByteStream, SessionError>> + Send + 'static,
    {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let (events_tx, events_rx) = mpsc::channel(options.channel_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let cancel = CancellationToken::new();

        let session = StreamSession {
            pipeline: Pipeline::new(&options),
            options,
            invocations: Vec::new(),
            events: events_tx,
            state: state_tx,
        };
        let span = tracing::debug_span!("stream_session", id);
        tokio::spawn(session.run(source, cancel.clone()).instrument(span));

        SessionHandle {
            id,
            events: events_rx,
            state: state_rx,
            cancel,
        }
    }

    async fn run<F>(mut self, source: F, cancel: CancellationToken)
    where
        F: Future<Output = Result<ByteStream, SessionError>> + Send,
    {
        if let Err(e) = self.options.validate() {
            warn!(error = %e, "invalid stream options");
            self.terminate(SessionEvent::Failed(e.to_string()), SessionState::Failed, &cancel)
                .await;
            return;
        }

        self.set_state(SessionState::Streaming);
        let now = Instant::now();
        let deadline = now
            .checked_add(self.options.max_duration)
            .unwrap_or_else(|| now + FAR_FUTURE);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Outcome::Closed,
            _ = time::sleep_until(deadline) => Outcome::TimedOut,
            outcome = self.read(source) => outcome,
        };

        match outcome {
            Outcome::Finished => {
                let turn = self.complete();
                debug!(
                    content_len = turn.content.len(),
                    tools = turn.tool_invocations.len(),
                    fallback = turn.fallback,
                    malformed = self.pipeline.malformed_frames(),
                    "stream completed"
                );
                self.terminate(SessionEvent::Completed(turn), SessionState::Completed, &cancel)
                    .await;
            }
            Outcome::TimedOut => {
                warn!(partial_len = self.pipeline.content().len(), "stream session timed out");
                let message = self.options.timeout_fallback.clone();
                self.terminate(SessionEvent::TimedOut(message), SessionState::TimedOut, &cancel)
                    .await;
            }
            Outcome::Failed(message) => {
                warn!(error = %message, "stream session failed");
                self.terminate(SessionEvent::Failed(message), SessionState::Failed, &cancel)
                    .await;
            }
            Outcome::Closed => {
                debug!("stream session cancelled");
                self.set_state(SessionState::Cancelled);
            }
        }
    }

    async fn read<F>(&mut self, source: F) -> Outcome
    where
        F: Future<Output = Result<ByteStream, SessionError>>,
    {
        let mut body = match source.await {
            Ok(body) => body,
            Err(e) => return Outcome::Failed(e.to_string()),
        };

        loop {
            let next = match self.options.idle_timeout {
                Some(idle) => match time::timeout(idle, body.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        debug!(?idle, "no data within idle timeout");
                        return Outcome::TimedOut;
                    }
                },
                None => body.next().await,
            };

            let events = match next {
                Some(Ok(chunk)) => self.pipeline.feed(&chunk),
                Some(Err(e)) => vec![self.pipeline.fail(e.to_string())],
                None => self.pipeline.finish(),
            };

            if let Some(outcome) = self.forward(events).await {
                return outcome;
            }
        }
    }

    /// Apply pipeline output to the session; returns the outcome once the
    /// stream is over.
    async fn forward(&mut self, events: Vec<RecognizedEvent>) -> Option<Outcome> {
        let mut outcome = None;
        for event in events {
            match event {
                RecognizedEvent::ContentDelta(text) => {
                    if self.events.send(SessionEvent::ContentDelta(text)).await.is_err() {
                        debug!("event receiver dropped");
                        return Some(Outcome::Closed);
                    }
                }
                RecognizedEvent::StreamEnd => {
                    self.set_state(SessionState::Finalizing);
                    outcome = Some(Outcome::Finished);
                }
                RecognizedEvent::ToolInvocation(invocation) => self.invocations.push(invocation),
                RecognizedEvent::StreamError(message) => return Some(Outcome::Failed(message)),
            }
        }
        outcome
    }

    fn complete(&mut self) -> CompletedTurn {
        let content = self.pipeline.content().to_string();
        let tool_invocations = std::mem::take(&mut self.invocations);

        if content.trim().is_empty() && tool_invocations.is_empty() {
            debug!("stream produced no usable output");
            CompletedTurn {
                content: self.options.empty_fallback.clone(),
                tool_invocations,
                fallback: true,
            }
        } else {
            CompletedTurn {
                content,
                tool_invocations,
                fallback: false,
            }
        }
    }

    async fn terminate(&mut self, event: SessionEvent, state: SessionState, cancel: &CancellationToken) {
        self.set_state(state);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = self.events.send(event) => {}
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        debug!(from = ?previous, to = ?state, "session state");
    }
}

/// Caller side of a running session.
///
/// Dropping the handle cancels the session.
#[derive(Debug)]
pub struct SessionHandle {
    id: u64,
    events: mpsc::Receiver<SessionEvent>,
    state: watch::Receiver<SessionState>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Process-unique session id, also recorded on the session's tracing span.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receive the next event; `None` once the session is over.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Skip content deltas and return the terminal event.
    ///
    /// Returns `None` if the session was cancelled.
    pub async fn finish(&mut self) -> Option<SessionEvent> {
        while let Some(event) = self.events.recv().await {
            if event.is_terminal() {
                return Some(event);
            }
        }
        None
    }

    /// Current state of the session.
    pub fn state(&self) -> SessionState {
        let state = *self.state.borrow();
        if self.cancel.is_cancelled() && !state.is_terminal() {
            SessionState::Cancelled
        } else {
            state
        }
    }

    /// Wait until the session task has reached a terminal state.
    pub async fn closed(&mut self) -> SessionState {
        let _ = self.state.wait_for(SessionState::is_terminal).await;
        self.state()
    }

    /// Stop the session. Safe to call in any state and more than once.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!(id = self.id, "cancelling stream session");
            self.cancel.cancel();
        }
    }
}

impl Stream for SessionHandle {
    type Item = SessionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Holds at most one live session.
///
/// Starting a new turn while the previous response is still streaming
/// cancels the previous session, so its chunks can never reach the new one.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: Option<SessionHandle>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new session, cancelling the one it replaces.
    pub fn replace(&mut self, handle: SessionHandle) -> &mut SessionHandle {
        if let Some(previous) = self.current.take() {
            if !previous.state().is_terminal() {
                debug!(previous = previous.id(), next = handle.id(), "replacing live session");
            }
            previous.cancel();
        }
        self.current.insert(handle)
    }

    /// The current session, if any.
    pub fn current(&mut self) -> Option<&mut SessionHandle> {
        self.current.as_mut()
    }

    /// Remove the current session without cancelling it.
    pub fn take(&mut self) -> Option<SessionHandle> {
        self.current.take()
    }

    /// Cancel and drop the current session.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.cancel();
        }
    }
}
