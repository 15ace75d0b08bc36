//! Events and state exchanged between the aggregator and its caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A fully assembled tool call.
///
/// Only produced once the accumulated argument text decoded as a complete
/// JSON value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    /// Call index assigned by the producer
    pub index: usize,

    /// Call id, when the producer sends one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Tool name
    pub name: String,

    /// Parsed argument payload
    pub arguments: Value,
}

/// Output unit of the synchronous pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizedEvent {
    /// Cumulative content seen so far in this stream
    ContentDelta(String),

    /// A tool call that was assembled and decoded at stream end
    ToolInvocation(ToolInvocation),

    /// The stream is over; no further frames will be processed
    StreamEnd,

    /// Transport failure reported into the pipeline
    StreamError(String),
}

/// Final result of a completed session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedTurn {
    /// Full content, or the empty-output fallback text
    pub content: String,

    /// Decoded tool calls in ascending index order
    pub tool_invocations: Vec<ToolInvocation>,

    /// Whether `content` is the fallback rather than producer output
    pub fallback: bool,
}

/// Events delivered to the caller of a session.
///
/// A session yields zero or more `ContentDelta` events followed by exactly one
/// terminal event, unless it was cancelled by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Cumulative text; callers render the latest value, not a diff
    ContentDelta(String),

    /// Stream finished normally
    Completed(CompletedTurn),

    /// Time budget exceeded; carries the timeout fallback text
    TimedOut(String),

    /// Transport-level failure
    Failed(String),
}

impl SessionEvent {
    /// Whether this event ends the session.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionEvent::ContentDelta(_))
    }
}

/// Lifecycle of a stream session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Streaming,
    Finalizing,
    Completed,
    TimedOut,
    Failed,
    /// Ended by the caller before reaching another terminal state
    Cancelled,
}

impl SessionState {
    /// Whether no further events can be emitted from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed
                | SessionState::TimedOut
                | SessionState::Failed
                | SessionState::Cancelled
        )
    }
}
