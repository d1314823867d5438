//! Per-turn session controller.
//!
//! Consumes the event stream of one conversational turn and drives the
//! visible surfaces: tool indicators, the incremental answer, and the error
//! state. Transitions are explicit; an event that does not fit the current
//! state is dropped rather than guessed at.
//!
//! Failure handling is all-or-nothing: any error mid-turn discards the
//! partially rendered answer, clears every indicator, and surfaces exactly
//! one user-facing message.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use quill_core::{ChatEvent, Error, Result};

use crate::sink::{TextSink, ThrottledBuffer};
use crate::tracker::ToolTracker;
use crate::transport::Transport;

/// State of one conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No turn in progress.
    Idle,
    /// Waiting for the model between tool activity.
    Thinking,
    /// At least one announced tool call is unresolved.
    ToolRunning,
    /// The final answer is streaming.
    Streaming,
    /// Terminal events received, flushing.
    Finalizing,
    /// Turn completed normally.
    Done,
    /// Turn torn down by an error.
    Errored,
}

/// Drives one turn at a time against a [`TextSink`].
pub struct SessionController<S: TextSink> {
    state: SessionState,
    tracker: ToolTracker,
    buffer: ThrottledBuffer,
    sink: S,
    first_delta_seen: bool,
    error_message: Option<String>,
    continuation: Option<String>,
    sources: Vec<Uuid>,
}

impl<S: TextSink> SessionController<S> {
    /// Create a controller rendering into the given sink.
    pub fn new(sink: S) -> Self {
        Self::with_refresh_interval(sink, crate::sink::DEFAULT_REFRESH_INTERVAL)
    }

    /// Create a controller with a custom answer refresh interval.
    pub fn with_refresh_interval(sink: S, interval: Duration) -> Self {
        Self {
            state: SessionState::Idle,
            tracker: ToolTracker::new(),
            buffer: ThrottledBuffer::with_interval(interval),
            sink,
            first_delta_seen: false,
            error_message: None,
            continuation: None,
            sources: Vec::new(),
        }
    }

    /// Run one turn to completion.
    ///
    /// The transport factory is awaited before the turn opens, so transports
    /// that need fresh credentials acquire them per turn. Only one turn may
    /// be live at a time; a turn may begin only from Idle, Done, or Errored.
    pub async fn run<T, Fut>(&mut self, connect: Fut) -> Result<()>
    where
        T: Transport,
        Fut: Future<Output = Result<T>>,
    {
        match self.state {
            SessionState::Idle | SessionState::Done | SessionState::Errored => {}
            _ => {
                return Err(Error::Validation(
                    "A turn is already streaming on this session".to_string(),
                ));
            }
        }
        self.begin_turn();

        let mut transport = match connect.await {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    subsystem = "agent",
                    component = "session",
                    error = %e,
                    "Transport connect failed"
                );
                self.teardown(e.user_message());
                return Ok(());
            }
        };
        self.state = SessionState::Thinking;

        loop {
            match transport.next_event().await {
                Some(Ok(event)) => {
                    let terminal = event.is_terminal();
                    self.apply(event);
                    if terminal {
                        return Ok(());
                    }
                }
                Some(Err(e)) => {
                    warn!(
                        subsystem = "agent",
                        component = "session",
                        error = %e,
                        "Transport error mid-turn"
                    );
                    self.teardown(e.user_message());
                    return Ok(());
                }
                // Closed without a terminal event: a dropped connection.
                None => {
                    self.teardown(
                        Error::StreamTransport("stream closed".to_string()).user_message(),
                    );
                    return Ok(());
                }
            }
        }
    }

    fn begin_turn(&mut self) {
        self.state = SessionState::Idle;
        self.tracker.clear();
        self.buffer.discard();
        self.first_delta_seen = false;
        self.error_message = None;
        self.sources.clear();
    }

    fn apply(&mut self, event: ChatEvent) {
        // Closed turns ignore stragglers.
        if matches!(self.state, SessionState::Done | SessionState::Errored) {
            return;
        }

        debug!(
            subsystem = "agent",
            component = "session",
            op = "apply",
            event = event.kind(),
            "Session event"
        );

        match event {
            ChatEvent::ToolCall { call_id, name, .. } => {
                self.tracker.start(call_id.as_deref(), &name);
                self.state = SessionState::ToolRunning;
            }
            ChatEvent::ToolResult { call_id, name } => {
                self.tracker.finish(call_id.as_deref(), &name);
                if self.tracker.has_pending() {
                    self.state = SessionState::ToolRunning;
                } else {
                    self.tracker.sweep_unkeyed();
                    self.state = SessionState::Thinking;
                }
            }
            ChatEvent::FinalStart => {
                self.state = SessionState::Streaming;
            }
            ChatEvent::FinalDelta { delta } => {
                if !self.first_delta_seen {
                    // The working indicator clears lazily, on the first
                    // visible text rather than on final_start.
                    self.first_delta_seen = true;
                    self.tracker.sweep_unkeyed();
                }
                self.buffer.push(&delta, &mut self.sink);
            }
            ChatEvent::FinalDone {
                response_id,
                sources,
            } => {
                self.state = SessionState::Finalizing;
                self.buffer.finish(&mut self.sink);
                // A turn with zero deltas never hit the first-delta sweep.
                self.tracker.sweep_unkeyed();
                self.continuation = response_id;
                self.sources = sources;
                self.state = SessionState::Done;
            }
            ChatEvent::Final {
                response,
                response_id,
                sources,
            } => {
                self.sink.set_full(&response);
                self.tracker.sweep_unkeyed();
                self.continuation = response_id;
                self.sources = sources;
                self.state = SessionState::Done;
            }
            ChatEvent::Error { message, .. } => {
                self.teardown(message);
            }
        }
    }

    /// Drop every turn surface and forget the continuation token.
    ///
    /// For sign-out or an explicit conversation restart; the next turn
    /// starts a fresh thread.
    pub fn reset(&mut self) {
        self.begin_turn();
        self.sink.clear();
        self.continuation = None;
    }

    /// Discard everything this turn rendered and surface one message.
    fn teardown(&mut self, message: String) {
        if self.state == SessionState::Errored {
            return;
        }
        self.buffer.discard();
        self.sink.clear();
        self.tracker.clear();
        self.error_message = Some(message);
        self.state = SessionState::Errored;
    }

    /// Current turn state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The rendered answer surface.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Tool indicators for the current turn.
    pub fn tracker(&self) -> &ToolTracker {
        &self.tracker
    }

    /// User-facing error message, if the turn failed.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Continuation token to thread into the next turn.
    pub fn continuation(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    /// Note ids the answer drew on.
    pub fn sources(&self) -> &[Uuid] {
        &self.sources
    }
}
