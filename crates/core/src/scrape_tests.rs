// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn markers_in_one_chunk() {
    let mut scanner = MarkerScanner::new();
    let hits = scanner.feed("Welcome to Claude Code v1");
    assert_eq!(hits, vec![Marker::Boot]);
}

#[test]
fn marker_straddling_a_chunk_boundary() {
    let mut scanner = MarkerScanner::new();
    assert!(scanner.feed("...(no con").is_empty());
    assert_eq!(scanner.feed("tent)..."), vec![Marker::Clear]);
}

#[test]
fn either_farewell_reports_exit() {
    let mut a = MarkerScanner::new();
    assert_eq!(a.feed("Goodbye\n"), vec![Marker::Exit]);
    let mut b = MarkerScanner::new();
    assert_eq!(b.feed("Session ended\n"), vec![Marker::Exit]);
}

#[test]
fn a_hit_is_not_reported_twice_from_the_overlap_tail() {
    let mut scanner = MarkerScanner::new();
    assert_eq!(scanner.feed("Pasted text"), vec![Marker::PasteEcho]);
    assert!(scanner.feed(" and more output").is_empty());
}

#[test]
fn plain_output_reports_nothing() {
    let mut scanner = MarkerScanner::new();
    assert!(scanner.feed("$ ls\nsrc tests\n").is_empty());
}

#[test]
fn multibyte_output_does_not_split_the_tail_mid_char() {
    let mut scanner = MarkerScanner::new();
    // 20 snowmen exceed the overlap window in bytes; must not panic.
    assert!(scanner.feed(&"☃".repeat(20)).is_empty());
    assert!(scanner.feed("plain").is_empty());
}
