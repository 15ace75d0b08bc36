//! Session options: wire-format conventions, extraction paths, timeouts and
//! fallback texts.
//!
//! Everything provider-specific is configurable so the same session core can
//! be pointed at different upstream producers. The defaults match the OpenAI
//! chat-completions streaming format.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SessionError;

const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_MAX_TOOL_CALLS: usize = 64;
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Text handed to the caller when a stream completes without any usable output.
pub const DEFAULT_EMPTY_FALLBACK: &str =
    "The assistant returned an empty response. Please try again.";

/// Text handed to the caller when a session exceeds its time budget.
pub const DEFAULT_TIMEOUT_FALLBACK: &str =
    "The response is taking too long. Please try again in a moment.";

/// JSON pointers locating content and tool-call fields inside a payload.
///
/// `tool_calls` points at an array of fragments; the remaining fragment paths
/// are relative to each element of that array. An empty pointer refers to the
/// whole value, as in [`serde_json::Value::pointer`].
///
/// # Example
/// ```rust
/// use chatstream::options::ExtractionPaths;
///
/// // A producer that nests deltas under `message`
/// let paths = ExtractionPaths::default()
///     .with_content("/message/content")
///     .with_tool_calls("/message/tool_calls");
/// assert_eq!(paths.index, "/index");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExtractionPaths {
    /// Incremental content string
    pub content: String,

    /// Array of partial tool-call fragments
    pub tool_calls: String,

    /// Call index within a fragment
    pub index: String,

    /// Call id within a fragment
    pub id: String,

    /// Tool name within a fragment
    pub name: String,

    /// Partial argument string within a fragment
    pub arguments: String,
}

impl Default for ExtractionPaths {
    fn default() -> Self {
        Self {
            content: "/choices/0/delta/content".to_string(),
            tool_calls: "/choices/0/delta/tool_calls".to_string(),
            index: "/index".to_string(),
            id: "/id".to_string(),
            name: "/function/name".to_string(),
            arguments: "/function/arguments".to_string(),
        }
    }
}

impl ExtractionPaths {
    pub fn with_content(mut self, pointer: impl Into<String>) -> Self {
        self.content = pointer.into();
        self
    }

    pub fn with_tool_calls(mut self, pointer: impl Into<String>) -> Self {
        self.tool_calls = pointer.into();
        self
    }

    pub fn with_index(mut self, pointer: impl Into<String>) -> Self {
        self.index = pointer.into();
        self
    }

    pub fn with_id(mut self, pointer: impl Into<String>) -> Self {
        self.id = pointer.into();
        self
    }

    pub fn with_name(mut self, pointer: impl Into<String>) -> Self {
        self.name = pointer.into();
        self
    }

    pub fn with_arguments(mut self, pointer: impl Into<String>) -> Self {
        self.arguments = pointer.into();
        self
    }

    fn validate(&self) -> Result<(), SessionError> {
        let pointers = [
            ("content", &self.content),
            ("tool_calls", &self.tool_calls),
            ("index", &self.index),
            ("id", &self.id),
            ("name", &self.name),
            ("arguments", &self.arguments),
        ];
        for (field, pointer) in pointers {
            if !pointer.is_empty() && !pointer.starts_with('/') {
                return Err(SessionError::Config(format!(
                    "extraction path `{field}` must be empty or start with '/': {pointer:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Options for one stream session.
///
/// # Example
/// ```rust
/// use chatstream::options::StreamOptions;
/// use std::time::Duration;
///
/// let options = StreamOptions::new()
///     .with_max_duration(Duration::from_secs(30))
///     .with_recognized_tools(vec!["generate_poster_copy".to_string()]);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// Total time budget for the session, measured from start
    pub max_duration: Duration,

    /// Maximum silence between two chunks, if any
    pub idle_timeout: Option<Duration>,

    /// Frame delimiter
    pub delimiter: String,

    /// Prefix every payload-carrying frame starts with
    pub frame_prefix: String,

    /// Payload value that terminates the stream
    pub done_marker: String,

    /// Where content and tool-call fields live inside a payload
    pub paths: ExtractionPaths,

    /// Final text used when the stream produced no usable output
    pub empty_fallback: String,

    /// Terminal text used when the session times out
    pub timeout_fallback: String,

    /// Tool names to dispatch; `None` dispatches every named call
    pub recognized_tools: Option<Vec<String>>,

    /// Highest number of distinct call indices tracked per session
    pub max_tool_calls: usize,

    /// Capacity of the event channel between the read loop and the caller
    pub channel_capacity: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            max_duration: DEFAULT_MAX_DURATION,
            idle_timeout: None,
            delimiter: "\n".to_string(),
            frame_prefix: "data:".to_string(),
            done_marker: "[DONE]".to_string(),
            paths: ExtractionPaths::default(),
            empty_fallback: DEFAULT_EMPTY_FALLBACK.to_string(),
            timeout_fallback: DEFAULT_TIMEOUT_FALLBACK.to_string(),
            recognized_tools: None,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl StreamOptions {
    /// Create options with the OpenAI-compatible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total session time budget.
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    /// Set the maximum silence allowed between chunks.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    /// Set the frame delimiter.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Set the frame prefix.
    pub fn with_frame_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.frame_prefix = prefix.into();
        self
    }

    /// Set the termination sentinel.
    pub fn with_done_marker(mut self, marker: impl Into<String>) -> Self {
        self.done_marker = marker.into();
        self
    }

    /// Set the payload extraction paths.
    pub fn with_paths(mut self, paths: ExtractionPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Set the empty-output fallback text.
    pub fn with_empty_fallback(mut self, text: impl Into<String>) -> Self {
        self.empty_fallback = text.into();
        self
    }

    /// Set the timeout fallback text.
    pub fn with_timeout_fallback(mut self, text: impl Into<String>) -> Self {
        self.timeout_fallback = text.into();
        self
    }

    /// Restrict dispatch to the given tool names.
    pub fn with_recognized_tools(mut self, names: Vec<String>) -> Self {
        self.recognized_tools = Some(names);
        self
    }

    /// Set the maximum number of tracked call indices.
    pub fn with_max_tool_calls(mut self, max: usize) -> Self {
        self.max_tool_calls = max;
        self
    }

    /// Set the event channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Check the options for values the session cannot work with.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.delimiter.is_empty() {
            return Err(SessionError::Config("frame delimiter must not be empty".to_string()));
        }
        if self.frame_prefix.is_empty() {
            return Err(SessionError::Config("frame prefix must not be empty".to_string()));
        }
        if self.done_marker.trim().is_empty() {
            return Err(SessionError::Config("done marker must not be empty".to_string()));
        }
        if self.max_tool_calls == 0 {
            return Err(SessionError::Config("max_tool_calls must be at least 1".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(SessionError::Config("channel_capacity must be at least 1".to_string()));
        }
        if self.empty_fallback.trim().is_empty() || self.timeout_fallback.trim().is_empty() {
            return Err(SessionError::Config("fallback texts must not be empty".to_string()));
        }
        self.paths.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = StreamOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.frame_prefix, "data:");
        assert_eq!(options.done_marker, "[DONE]");
        assert!(options.recognized_tools.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(StreamOptions::new().with_delimiter("").validate().is_err());
        assert!(StreamOptions::new().with_frame_prefix("").validate().is_err());
        assert!(StreamOptions::new().with_done_marker("  ").validate().is_err());
        assert!(StreamOptions::new().with_max_tool_calls(0).validate().is_err());
        assert!(StreamOptions::new().with_channel_capacity(0).validate().is_err());
        assert!(StreamOptions::new().with_empty_fallback("").validate().is_err());

        let paths = ExtractionPaths::default().with_content("choices/0");
        let err = StreamOptions::new().with_paths(paths).validate().unwrap_err();
        assert!(err.to_string().contains("content"));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let options: StreamOptions = serde_json::from_str(
            r#"{"done_marker":"<END>","idle_timeout":{"secs":5,"nanos":0},"paths":{"content":"/text"}}"#,
        )
        .unwrap();
        assert_eq!(options.done_marker, "<END>");
        assert_eq!(options.idle_timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.paths.content, "/text");
        assert_eq!(options.paths.tool_calls, "/choices/0/delta/tool_calls");
        assert_eq!(options.max_duration, DEFAULT_MAX_DURATION);
    }
}
