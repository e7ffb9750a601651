// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Textual markers scraped from the assistant CLI's terminal output.
//!
//! The engine reads only these narrow patterns from child output. They are
//! collected here so supporting a different assistant binary is a one-file
//! change.

use serde::{Deserialize, Serialize};

/// Banner substring printed when the assistant has booted.
pub const BOOT_BANNER: &str = "Claude Code";
/// Printed after the user clears the conversation; the cached session id is
/// stale from this point on.
pub const CLEAR_MARKER: &str = "(no content)";
/// Echoed when the assistant detects a bracketed paste.
pub const PASTE_ECHO: &str = "Pasted text";
/// Farewell lines printed when the assistant session ends.
pub const EXIT_FAREWELLS: [&str; 2] = ["Goodbye", "Session ended"];
/// In-band command that asks the assistant to exit.
pub const EXIT_COMMAND: &str = "/exit";

/// Markers the scanner reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    Boot,
    Clear,
    PasteEcho,
    Exit,
}

/// Longest marker string; the scanner keeps one byte less as overlap tail.
const MAX_MARKER_LEN: usize = 16;

/// Incremental marker scanner for one terminal.
///
/// Output arrives in arbitrary chunks, so a marker can straddle a chunk
/// boundary. The scanner keeps a short tail of previous output and matches
/// against tail + chunk.
#[derive(Debug, Default)]
pub struct MarkerScanner {
    tail: String,
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of terminal output; returns the markers seen, in the
    /// order they are defined (duplicates within one chunk collapse).
    pub fn feed(&mut self, chunk: &str) -> Vec<Marker> {
        let mut window = String::with_capacity(self.tail.len() + chunk.len());
        window.push_str(&self.tail);
        window.push_str(chunk);

        let mut hits = Vec::new();
        if window.contains(BOOT_BANNER) {
            hits.push(Marker::Boot);
        }
        if window.contains(CLEAR_MARKER) {
            hits.push(Marker::Clear);
        }
        if window.contains(PASTE_ECHO) {
            hits.push(Marker::PasteEcho);
        }
        if EXIT_FAREWELLS.iter().any(|m| window.contains(m)) {
            hits.push(Marker::Exit);
        }

        if hits.is_empty() {
            // Keep a char-boundary-safe overlap tail.
            let keep = MAX_MARKER_LEN.saturating_sub(1);
            let start = window
                .char_indices()
                .rev()
                .take(keep)
                .last()
                .map(|(i, _)| i)
                .unwrap_or(window.len());
            self.tail = window[start..].to_string();
        } else {
            // Drop the tail after a hit so the same occurrence is not
            // reported again when it lingers in the overlap window.
            self.tail.clear();
        }
        hits
    }
}

#[cfg(test)]
#[path = "scrape_tests.rs"]
mod tests;
