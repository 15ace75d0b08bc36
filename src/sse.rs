//! Server-Sent Events (SSE) framing and payload parsing.
//!
//! SSE format:
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! Frame boundaries do not line up with transport chunks, so
//! [`FrameSplitter`] keeps the trailing partial line until the rest of it
//! arrives. [`FrameParser`] turns each complete line into a JSON payload, the
//! end-of-stream marker, or nothing.

use serde_json::Value;

use crate::options::StreamOptions;

/// Rolling line buffer that yields complete frames in order.
///
/// # Example
/// ```
/// use chatstream::sse::FrameSplitter;
///
/// let mut splitter = FrameSplitter::new("\n");
/// assert!(splitter.push("data: {\"a\"").is_empty());
/// assert_eq!(splitter.push(":1}\ndata: [DO"), vec!["data: {\"a\":1}"]);
/// assert_eq!(splitter.finish(), Some("data: [DO".to_string()));
/// ```
#[derive(Debug)]
pub struct FrameSplitter {
    buffer: String,
    delimiter: String,
}

impl FrameSplitter {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            buffer: String::new(),
            delimiter: delimiter.into(),
        }
    }

    /// Append decoded text and return every frame it completes.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = self.buffer[consumed..].find(self.delimiter.as_str()) {
            frames.push(self.buffer[consumed..consumed + pos].to_string());
            consumed += pos + self.delimiter.len();
        }
        self.buffer.drain(..consumed);

        frames
    }

    /// Flush the buffer at end of stream.
    ///
    /// Returns the last frame when the producer did not terminate it.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    /// Text received but not yet part of a complete frame.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }
}

/// Outcome of parsing one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedFrame {
    /// A decoded JSON payload
    Payload(Value),

    /// The termination sentinel
    Done,

    /// Blank line, comment, or a field other than the payload prefix
    Ignored,

    /// The payload did not decode; carries the decoder message
    Malformed(String),
}

/// Turns complete frames into payloads.
#[derive(Debug, Clone)]
pub struct FrameParser {
    prefix: String,
    done_marker: String,
}

impl FrameParser {
    pub fn new(prefix: impl Into<String>, done_marker: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            done_marker: done_marker.into(),
        }
    }

    pub fn from_options(options: &StreamOptions) -> Self {
        Self::new(options.frame_prefix.clone(), options.done_marker.clone())
    }

    /// Classify and decode one frame.
    ///
    /// # Example
    /// ```
    /// use chatstream::sse::{FrameParser, ParsedFrame};
    ///
    /// let parser = FrameParser::new("data:", "[DONE]");
    /// assert_eq!(parser.parse("data: [DONE]"), ParsedFrame::Done);
    /// assert_eq!(parser.parse(": keep-alive"), ParsedFrame::Ignored);
    /// assert!(matches!(parser.parse("data: {\"a\":"), ParsedFrame::Malformed(_)));
    /// ```
    pub fn parse(&self, frame: &str) -> ParsedFrame {
        let line = frame.trim();
        if line.is_empty() {
            return ParsedFrame::Ignored;
        }

        let Some(data) = parse_sse_line(line, &self.prefix) else {
            return ParsedFrame::Ignored;
        };

        if is_done_marker(data, &self.done_marker) {
            return ParsedFrame::Done;
        }
        if data.is_empty() {
            return ParsedFrame::Ignored;
        }

        match serde_json::from_str::<Value>(data) {
            Ok(value) => ParsedFrame::Payload(value),
            Err(e) => ParsedFrame::Malformed(e.to_string()),
        }
    }
}

/// Extract the data portion of an SSE line.
///
/// Whitespace after the prefix is optional, as in the SSE grammar.
///
/// # Example
/// ```
/// use chatstream::sse::parse_sse_line;
///
/// assert_eq!(parse_sse_line("data: {\"key\": 1}", "data:"), Some("{\"key\": 1}"));
/// assert_eq!(parse_sse_line("data:[DONE]", "data:"), Some("[DONE]"));
/// assert_eq!(parse_sse_line("event: ping", "data:"), None);
/// ```
pub fn parse_sse_line<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix).map(|s| s.trim())
}

/// Check if an SSE data value is the end-of-stream marker.
///
/// # Example
/// ```
/// use chatstream::sse::is_done_marker;
///
/// assert!(is_done_marker("[DONE]", "[DONE]"));
/// assert!(!is_done_marker("", "[DONE]"));
/// assert!(!is_done_marker("{\"data\": \"value\"}", "[DONE]"));
/// ```
pub fn is_done_marker(data: &str, marker: &str) -> bool {
    data == marker
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line("data: hello", "data:"), Some("hello"));
        assert_eq!(
            parse_sse_line("data: {\"key\": \"value\"}", "data:"),
            Some("{\"key\": \"value\"}")
        );
        assert_eq!(parse_sse_line("data:   spaces  ", "data:"), Some("spaces"));
        assert_eq!(parse_sse_line("invalid", "data:"), None);
        assert_eq!(parse_sse_line("", "data:"), None);
    }

    #[test]
    fn test_is_done_marker() {
        assert!(is_done_marker("[DONE]", "[DONE]"));
        assert!(is_done_marker("<END>", "<END>"));
        assert!(!is_done_marker("", "[DONE]"));
        assert!(!is_done_marker("data", "[DONE]"));
        assert!(!is_done_marker("{\"key\": \"value\"}", "[DONE]"));
    }

    #[test]
    fn test_splitter_keeps_partial_line() {
        let mut splitter = FrameSplitter::new("\n");
        assert!(splitter.push("data: 1").is_empty());
        assert_eq!(splitter.buffered(), "data: 1");
        assert_eq!(splitter.push("\ndata: 2\n"), vec!["data: 1", "data: 2"]);
        assert_eq!(splitter.buffered(), "");
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_splitter_emits_empty_frames_in_order() {
        let mut splitter = FrameSplitter::new("\n");
        assert_eq!(splitter.push("a\n\nb\n"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_splitter_multi_char_delimiter_across_chunks() {
        let mut splitter = FrameSplitter::new("\r\n\r\n");
        assert!(splitter.push("data: 1\r\n").is_empty());
        assert!(splitter.push("\r").is_empty());
        assert_eq!(splitter.push("\ndata: 2\r\n\r\ndata"), vec!["data: 1", "data: 2"]);
        assert_eq!(splitter.finish(), Some("data".to_string()));
    }

    #[test]
    fn test_splitter_finish_skips_whitespace_tail() {
        let mut splitter = FrameSplitter::new("\n");
        splitter.push("data: 1\n  ");
        assert_eq!(splitter.finish(), None);
        assert_eq!(splitter.buffered(), "");
    }

    #[test]
    fn test_parser_classifies_frames() {
        let parser = FrameParser::new("data:", "[DONE]");

        assert_eq!(parser.parse(""), ParsedFrame::Ignored);
        assert_eq!(parser.parse("   \r"), ParsedFrame::Ignored);
        assert_eq!(parser.parse(": ping"), ParsedFrame::Ignored);
        assert_eq!(parser.parse("event: message"), ParsedFrame::Ignored);
        assert_eq!(parser.parse("data:"), ParsedFrame::Ignored);
        assert_eq!(parser.parse("data: [DONE]\r"), ParsedFrame::Done);
        assert_eq!(
            parser.parse("data: {\"choices\":[]}\r"),
            ParsedFrame::Payload(json!({"choices": []}))
        );
        assert!(matches!(parser.parse("data: {not json}"), ParsedFrame::Malformed(_)));
    }

    #[test]
    fn test_parser_custom_prefix_and_marker() {
        let options = StreamOptions::new()
            .with_frame_prefix("chunk=")
            .with_done_marker("<END>");
        let parser = FrameParser::from_options(&options);

        assert_eq!(parser.parse("chunk=<END>"), ParsedFrame::Done);
        assert_eq!(parser.parse("data: [DONE]"), ParsedFrame::Ignored);
        assert_eq!(parser.parse("chunk={\"x\":1}"), ParsedFrame::Payload(json!({"x": 1})));
    }
}
