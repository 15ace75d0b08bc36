//! Incremental UTF-8 decoding of transport chunks.
//!
//! HTTP bodies arrive in arbitrary byte boundaries, so a multi-byte character
//! can be split across two chunks. Decoding every chunk on its own would turn
//! both halves into garbage; [`Utf8ChunkDecoder`] keeps the incomplete tail and
//! completes it with the next chunk instead.

const REPLACEMENT: char = '\u{FFFD}';
const BOM: char = '\u{FEFF}';

/// Stateful UTF-8 decoder for a single byte stream.
///
/// Invalid sequences are replaced with U+FFFD; decoding never fails.
///
/// # Example
/// ```
/// use chatstream::decode::Utf8ChunkDecoder;
///
/// let bytes = "héllo".as_bytes();
/// let mut decoder = Utf8ChunkDecoder::new();
/// let mut text = decoder.decode(&bytes[..2]);
/// text.push_str(&decoder.decode(&bytes[2..]));
/// text.push_str(&decoder.finish());
/// assert_eq!(text, "héllo");
/// ```
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
    started: bool,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk, returning all text that is complete so far.
    ///
    /// A trailing incomplete sequence is held back until the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(chunk);

        let mut out = String::with_capacity(input.len());
        let mut rest: &[u8] = &input;

        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());

                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT);
                            rest = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end of input.
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        self.strip_bom(out)
    }

    /// Flush the decoder at end of stream.
    ///
    /// A dangling incomplete sequence becomes a single replacement character.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            REPLACEMENT.to_string()
        }
    }

    fn strip_bom(&mut self, mut out: String) -> String {
        if !self.started && !out.is_empty() {
            self.started = true;
            if out.starts_with(BOM) {
                out.drain(..BOM.len_utf8());
            }
        }
        out
    }
}
