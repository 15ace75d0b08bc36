//! Synchronous reducer from raw body chunks to recognized events.
//!
//! [`Pipeline`] owns every piece of per-stream parsing state: the UTF-8
//! decoder, the frame buffer and the delta accumulators. It performs no I/O and
//! knows nothing about time, which leaves [`crate::session`] to deal with the
//! read loop, timeouts and cancellation.

use tracing::{debug, trace};

use crate::aggregate::DeltaAggregator;
use crate::decode::Utf8ChunkDecoder;
use crate::dispatch::ToolCallDispatcher;
use crate::model::RecognizedEvent;
use crate::options::StreamOptions;
use crate::sse::{FrameParser, FrameSplitter, ParsedFrame};

/// Per-stream parsing state.
///
/// # Example
/// ```
/// use chatstream::model::RecognizedEvent;
/// use chatstream::options::StreamOptions;
/// use chatstream::pipeline::Pipeline;
///
/// let mut pipeline = Pipeline::new(&StreamOptions::default());
/// let events = pipeline.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\ndata: [DONE]\n");
/// assert_eq!(events, vec![
///     RecognizedEvent::ContentDelta("Hi".to_string()),
///     RecognizedEvent::StreamEnd,
/// ]);
/// assert!(pipeline.is_finished());
/// ```
#[derive(Debug)]
pub struct Pipeline {
    decoder: Utf8ChunkDecoder,
    splitter: FrameSplitter,
    parser: FrameParser,
    aggregator: DeltaAggregator,
    dispatcher: ToolCallDispatcher,
    finished: bool,
    malformed: usize,
}

impl Pipeline {
    pub fn new(options: &StreamOptions) -> Self {
        Self {
            decoder: Utf8ChunkDecoder::new(),
            splitter: FrameSplitter::new(options.delimiter.clone()),
            parser: FrameParser::from_options(options),
            aggregator: DeltaAggregator::from_options(options),
            dispatcher: ToolCallDispatcher::from_options(options),
            finished: false,
            malformed: 0,
        }
    }

    /// Feed one raw chunk.
    ///
    /// Once the stream has ended (sentinel seen, [`finish`](Self::finish) or
    /// [`fail`](Self::fail) called) further chunks are ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RecognizedEvent> {
        if self.finished {
            trace!(bytes = chunk.len(), "chunk after end of stream ignored");
            return Vec::new();
        }

        let text = self.decoder.decode(chunk);
        let mut events = Vec::new();
        for frame in self.splitter.push(&text) {
            self.process_frame(&frame, &mut events);
            if self.finished {
                break;
            }
        }
        events
    }

    /// Signal that the body ended.
    ///
    /// Flushes a trailing frame without delimiter, then finalizes the stream
    /// unless a sentinel inside that frame already did.
    pub fn finish(&mut self) -> Vec<RecognizedEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();
        let tail = self.decoder.finish();
        let mut frames = self.splitter.push(&tail);
        frames.extend(self.splitter.finish());

        for frame in frames {
            self.process_frame(&frame, &mut events);
            if self.finished {
                return events;
            }
        }

        self.end(&mut events);
        events
    }

    /// Record a transport failure. Accumulated output is discarded.
    pub fn fail(&mut self, message: impl Into<String>) -> RecognizedEvent {
        self.finished = true;
        self.splitter.finish();
        self.aggregator.take_tool_calls();
        RecognizedEvent::StreamError(message.into())
    }

    /// Whether the stream has ended.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Content accumulated so far.
    pub fn content(&self) -> &str {
        self.aggregator.content()
    }

    /// Number of frames that failed to decode.
    pub fn malformed_frames(&self) -> usize {
        self.malformed
    }

    fn process_frame(&mut self, frame: &str, events: &mut Vec<RecognizedEvent>) {
        match self.parser.parse(frame) {
            ParsedFrame::Payload(payload) => {
                trace!(bytes = frame.len(), "payload frame");
                if let Some(content) = self.aggregator.apply(&payload) {
                    events.push(RecognizedEvent::ContentDelta(content));
                }
            }
            ParsedFrame::Done => {
                debug!("termination sentinel received");
                self.end(events);
            }
            ParsedFrame::Ignored => {}
            ParsedFrame::Malformed(error) => {
                self.malformed += 1;
                debug!(%error, frame = %preview(frame), "malformed frame skipped");
            }
        }
    }

    fn end(&mut self, events: &mut Vec<RecognizedEvent>) {
        self.finished = true;
        self.splitter.finish();
        events.push(RecognizedEvent::StreamEnd);

        let slots = self.aggregator.take_tool_calls();
        events.extend(
            self.dispatcher
                .dispatch(slots)
                .into_iter()
                .map(RecognizedEvent::ToolInvocation),
        );
    }
}

fn preview(frame: &str) -> &str {
    match frame.char_indices().nth(100) {
        Some((end, _)) => &frame[..end],
        None => frame,
    }
}
