//! Frame decoding for inbound stream payloads
//!
//! The backend does not guarantee one JSON object per WebSocket message. A
//! payload may hold a single object, several newline-delimited objects, or
//! several objects concatenated back to back with no separator.
//!
//! Line mode is used whenever the trimmed payload has more than one non-empty
//! line; each line is parsed on its own and a bad line is skipped. Otherwise
//! the payload is walked by [`FrameScanner`], which tracks brace depth outside
//! string literals and cuts a frame every time the depth returns to zero.

use serde_json::Value;
use tracing::{debug, warn};

/// Result of decoding one transport payload.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DecodedPayload {
    /// Parsed objects, in payload order
    pub frames: Vec<Value>,
    /// Fragments that could not be parsed (skipped lines or the halting fragment)
    pub failures: usize,
}

impl DecodedPayload {
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

/// Why the concatenated scanner stopped before the end of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameGap {
    /// Input ended inside an object; the tail is an incomplete frame.
    Truncated,
    /// Text that cannot start or close a top-level object.
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Outside,
    InString,
    Escaped,
}

/// Splits concatenated top-level JSON objects without parsing them.
///
/// Braces inside string literals (including escaped quotes and `\uXXXX`
/// sequences) do not affect depth. Yields each complete object as a slice of
/// the input; yields a single [`FrameGap`] and stops when the remainder is not
/// a complete object.
#[derive(Debug)]
pub struct FrameScanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> FrameScanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Byte offset of the first unconsumed character
    pub fn position(&self) -> usize {
        self.pos
    }

    fn halt(&mut self, gap: FrameGap) -> Option<Result<&'a str, FrameGap>> {
        self.pos = self.input.len();
        Some(Err(gap))
    }
}

impl<'a> Iterator for FrameScanner<'a> {
    type Item = Result<&'a str, FrameGap>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.input.as_bytes();

        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return None;
        }

        let start = self.pos;
        if bytes[start] != b'{' {
            return self.halt(FrameGap::Malformed);
        }

        let mut state = ScanState::Outside;
        let mut depth: usize = 0;

        // Structural characters are ASCII, so scanning bytes is UTF-8 safe.
        for (offset, &byte) in bytes[start..].iter().enumerate() {
            state = match state {
                ScanState::Escaped => ScanState::InString,
                ScanState::InString => match byte {
                    b'\\' => ScanState::Escaped,
                    b'"' => ScanState::Outside,
                    _ => ScanState::InString,
                },
                ScanState::Outside => match byte {
                    b'"' => ScanState::InString,
                    b'{' => {
                        depth += 1;
                        ScanState::Outside
                    }
                    b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            let end = start + offset + 1;
                            self.pos = end;
                            return Some(Ok(&self.input[start..end]));
                        }
                        ScanState::Outside
                    }
                    _ => ScanState::Outside,
                },
            };
        }

        self.halt(FrameGap::Truncated)
    }
}

/// Decode a raw transport payload into an ordered list of JSON objects.
///
/// Never fails: unparseable fragments are logged and counted in
/// [`DecodedPayload::failures`].
pub fn decode_payload(payload: &str) -> DecodedPayload {
    let mut decoded = DecodedPayload::default();
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return decoded;
    }

    let lines: Vec<&str> = trimmed
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() > 1 {
        for line in lines {
            match serde_json::from_str::<Value>(line) {
                Ok(value) => decoded.frames.push(value),
                Err(e) => {
                    warn!(error = %e, line = %line, "Skipping unparseable line");
                    decoded.failures += 1;
                }
            }
        }
        return decoded;
    }

    for frame in FrameScanner::new(trimmed) {
        match frame {
            Ok(text) => match serde_json::from_str::<Value>(text) {
                Ok(value) => decoded.frames.push(value),
                Err(e) => {
                    warn!(error = %e, frame = %text, "Failed to parse concatenated frame, dropping remainder");
                    decoded.failures += 1;
                    break;
                }
            },
            Err(FrameGap::Truncated) => {
                debug!(
                    parsed = decoded.frames.len(),
                    "Payload ends inside a frame, dropping incomplete tail"
                );
            }
            Err(FrameGap::Malformed) => {
                warn!(payload = %trimmed, "Payload contains text outside of a JSON object");
                decoded.failures += 1;
            }
        }
    }

    decoded
}
