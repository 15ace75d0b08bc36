//! # chatstream - Streaming Chat Response Aggregation
//!
//! Consumes a chat-completion response delivered as server-sent events and
//! turns it into a small set of caller-facing events: a growing text, the
//! tool invocations the model requested, and exactly one terminal outcome.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Chunk-boundary safe UTF-8 decoding and frame splitting
//! - Index-keyed tool-call accumulation with deferred argument decoding
//! - Total and idle timeouts, fallback texts for empty or stalled replies
//! - Cancellation that releases the underlying connection
//!
//! ## Architecture
//!
//! The per-byte work is a synchronous reducer ([`pipeline::Pipeline`]) built
//! from four stages:
//!
//! 1. [`decode::Utf8ChunkDecoder`]: bytes to text, holding back split characters
//! 2. [`sse::FrameSplitter`] and [`sse::FrameParser`]: text to frames to payloads
//! 3. [`aggregate::DeltaAggregator`]: content and tool-call fragments merged
//! 4. [`dispatch::ToolCallDispatcher`]: finished argument buffers decoded
//!
//! [`session::StreamSession`] drives the reducer from a body stream inside a
//! tokio task and reports through a [`session::SessionHandle`].
//!
//! ## Example
//! ```no_run
//! use chatstream::{SessionEvent, StreamOptions, StreamSession};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = reqwest::Client::new();
//!     let pending = client
//!         .post("https://api.example.com/v1/chat/completions")
//!         .bearer_auth("your-api-key")
//!         .json(&serde_json::json!({
//!             "model": "gpt-4o",
//!             "stream": true,
//!             "messages": [{"role": "user", "content": "Hello!"}]
//!         }))
//!         .send();
//!
//!     let options = StreamOptions::new().with_max_duration(Duration::from_secs(30));
//!     let mut handle = StreamSession::start_request(pending, options);
//!
//!     while let Some(event) = handle.next_event().await {
//!         match event {
//!             SessionEvent::ContentDelta(text) => println!("{text}"),
//!             SessionEvent::Completed(turn) => {
//!                 for call in turn.tool_invocations {
//!                     println!("tool {} -> {}", call.name, call.arguments);
//!                 }
//!             }
//!             SessionEvent::TimedOut(message) | SessionEvent::Failed(message) => {
//!                 eprintln!("{message}");
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod model;
pub mod options;
pub mod pipeline;
pub mod session;
pub mod sse;

// Re-exports for convenience
pub use error::SessionError;
pub use model::{CompletedTurn, SessionEvent, SessionState, ToolInvocation};
pub use options::{ExtractionPaths, StreamOptions};
pub use session::{SessionHandle, SessionSlot, StreamSession};
