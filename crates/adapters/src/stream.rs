// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental parser for the headless worker's stdout stream.
//!
//! The stream is newline-delimited JSON, but reads arrive as arbitrary byte
//! chunks under backpressure: a read may end mid-line, and one read may span
//! several lines. Bytes are buffered until a `\n`; there is no upper bound on
//! line length. Unparseable lines are counted and dropped.

use bm_core::StreamEvent;

#[derive(Debug, Default)]
pub struct StreamParser {
    buf: Vec<u8>,
    parse_failures: u64,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every complete event it terminated.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if let Some(event) = self.parse_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Parse whatever remains in the buffer as a final, unterminated line.
    /// Called when the stream closes.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.buf.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buf);
        self.parse_line(&line)
    }

    pub fn parse_failures(&self) -> u64 {
        self.parse_failures
    }

    fn parse_line(&mut self, line: &[u8]) -> Option<StreamEvent> {
        let trimmed = trim_ascii(line);
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_slice(trimmed) {
            Ok(event) => Some(event),
            Err(e) => {
                self.parse_failures += 1;
                tracing::debug!(
                    failures = self.parse_failures,
                    error = %e,
                    "dropped unparseable stream line"
                );
                None
            }
        }
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &bytes[start..end]
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
