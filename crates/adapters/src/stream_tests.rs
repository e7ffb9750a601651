// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bm_core::StreamEvent;

fn line(kind: &str) -> String {
    format!(r#"{{"type":"{}","timestamp":"t"}}"#, kind)
}

#[test]
fn whole_lines_parse_immediately() {
    let mut parser = StreamParser::new();
    let input = format!("{}\n{}\n", line("init"), line("message"));
    let events = parser.feed(input.as_bytes());
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], StreamEvent::Init { .. }));
    assert!(matches!(events[1], StreamEvent::Message { .. }));
}

#[test]
fn partial_lines_buffer_across_feeds() {
    let mut parser = StreamParser::new();
    let full = line("init");
    let (a, b) = full.split_at(10);
    assert!(parser.feed(a.as_bytes()).is_empty());
    let mut rest = b.as_bytes().to_vec();
    rest.push(b'\n');
    let events = parser.feed(&rest);
    assert_eq!(events.len(), 1);
}

#[test]
fn several_lines_in_one_chunk() {
    let mut parser = StreamParser::new();
    let input = format!("{}\n{}\n{}\n", line("init"), line("assistant"), line("result"));
    assert_eq!(parser.feed(input.as_bytes()).len(), 3);
}

#[test]
fn garbage_lines_count_failures_and_are_dropped() {
    let mut parser = StreamParser::new();
    let input = format!("not json\n{}\n{{\"type\":\"mystery\"}}\n", line("init"));
    let events = parser.feed(input.as_bytes());
    assert_eq!(events.len(), 1);
    assert_eq!(parser.parse_failures(), 2);
}

#[test]
fn blank_lines_are_ignored_silently() {
    let mut parser = StreamParser::new();
    assert!(parser.feed(b"\n  \n\n").is_empty());
    assert_eq!(parser.parse_failures(), 0);
}

#[test]
fn very_long_line_survives_chunked_delivery() {
    let mut parser = StreamParser::new();
    let payload = "x".repeat(512 * 1024);
    let full = format!(
        r#"{{"type":"message","timestamp":"t","text":"{}"}}"#,
        payload
    );
    for chunk in full.as_bytes().chunks(4096) {
        assert!(parser.feed(chunk).is_empty());
    }
    let events = parser.feed(b"\n");
    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::Message { text: Some(text), .. } => assert_eq!(text.len(), payload.len()),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn finish_parses_an_unterminated_final_line() {
    let mut parser = StreamParser::new();
    assert!(parser.feed(line("result").as_bytes()).is_empty());
    let event = parser.finish().unwrap();
    assert!(matches!(event, StreamEvent::Result { .. }));
    assert!(parser.finish().is_none());
}
