//! Line-framed stream events for the completion transport.
//!
//! The backend streams a reply as small JSON records, one per line, each
//! tagged by `type`: zero or more `chunk` deltas, then exactly one terminal
//! `done` (success, carrying the final full text) or `error`. Lines may
//! arrive split across network reads, so [`FrameParser`] buffers partial
//! lines between feeds and handles LF, CRLF, and bare-CR endings.

use crate::error::{Error, Result};
use crate::node::AnimationSuggestion;
use serde::{Deserialize, Serialize};

// ============================================================================
// Frames
// ============================================================================

/// One event in a streamed completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamFrame {
    /// Incremental text delta. Zero or more per response.
    Chunk { content: String },
    /// Terminal success: the final, full reply text.
    #[serde(rename_all = "camelCase")]
    Done {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        suggested_animation: Option<AnimationSuggestion>,
        /// Backend-side correlation id; the engine does not rely on it.
        #[serde(skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
    },
    /// Terminal failure with a human-readable message.
    Error { content: String },
}

impl StreamFrame {
    /// Whether this frame ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Incremental parser for a line-framed event stream.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: String,
    /// Whether we've already stripped the BOM from the first feed.
    bom_checked: bool,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw text and extract any complete frames.
    ///
    /// A malformed line yields an `Err(FrameDecode)` entry for that line
    /// only; parsing continues with the next line. Blank lines and `:`
    /// comment lines (SSE keep-alives) are skipped. An optional `data:`
    /// prefix on each line is stripped, so both bare-JSON-lines and
    /// SSE-style framing decode identically.
    pub fn feed(&mut self, data: &str) -> Vec<Result<StreamFrame>> {
        self.buffer.push_str(data);
        let mut buffer = std::mem::take(&mut self.buffer);

        if !self.bom_checked && !buffer.is_empty() {
            self.bom_checked = true;
            if buffer.starts_with('\u{FEFF}') {
                buffer.drain(..3);
            }
        }

        let mut frames = Vec::new();
        let mut start = 0usize;
        while let Some(rel_pos) = memchr::memchr2(b'\r', b'\n', &buffer.as_bytes()[start..]) {
            let pos = start + rel_pos;
            let b = buffer.as_bytes()[pos];

            let line_end;
            let next_start;
            if b == b'\n' {
                line_end = pos;
                next_start = pos + 1;
            } else if pos + 1 < buffer.len() {
                line_end = pos;
                next_start = if buffer.as_bytes()[pos + 1] == b'\n' {
                    pos + 2
                } else {
                    pos + 1
                };
            } else {
                // CR at end of buffer: wait for more data to check for LF.
                break;
            }

            if let Some(frame) = decode_line(&buffer[start..line_end]) {
                frames.push(frame);
            }
            start = next_start;
        }

        self.buffer = buffer.split_off(start);
        frames
    }

    /// Decode whatever remains in the buffer as a final unterminated line.
    pub fn flush(&mut self) -> Option<Result<StreamFrame>> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }
}

fn decode_line(line: &str) -> Option<Result<StreamFrame>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    Some(
        serde_json::from_str::<StreamFrame>(payload)
            .map_err(|e| Error::frame_decode(format!("{e}: {payload}"))),
    )
}
