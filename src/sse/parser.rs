// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Incremental Server-Sent Events parser
//!
//! Pure, byte-fed parser that turns an arbitrary chunking of an SSE byte
//! stream into discrete protocol messages. Framing per the SSE spec:
//! blank-line-terminated messages, multi-line `data:` joined with `\n`,
//! `event:` sets the message type, `id:` updates the resumption id
//! (ignored if it contains a NUL byte), `retry:` is ignored, lines
//! beginning with `:` are keepalive comments.
//!
//! The parser holds no transport state; reconnection is the caller's
//! concern (see [`super::backoff`]).

/// A parsed SSE protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// Event type; `"message"` when the stream did not set one
    pub event: String,
    /// Data payload; multiple `data:` lines joined with `\n`
    pub data: String,
    /// Resumption id in effect when this message was dispatched
    pub id: Option<String>,
}

/// Incremental SSE parser
///
/// Feed raw bytes in any chunking; complete messages are returned as they
/// are terminated. An identical byte stream yields an identical message
/// sequence regardless of chunk boundaries.
#[derive(Debug, Default)]
pub struct SseParser {
    /// Bytes of the current, not-yet-terminated line
    line_buf: Vec<u8>,
    /// Event type of the message being accumulated
    event: Option<String>,
    /// Accumulated `data:` lines
    data: Vec<String>,
    /// Current resumption id
    last_event_id: Option<String>,
}

impl SseParser {
    /// Create a new parser
    pub fn new() -> Self {
        Self::default()
    }

    /// The current resumption id, for a `Last-Event-ID` reconnect header
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Feed a chunk of bytes, returning any messages completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        let mut out = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&self.line_buf).into_owned();
                self.line_buf.clear();
                self.process_line(line.strip_suffix('\r').unwrap_or(&line), &mut out);
            } else {
                self.line_buf.push(byte);
            }
        }
        out
    }

    /// Flush at end of stream. A final message lacking its terminating
    /// blank line is dispatched if it accumulated any data.
    pub fn finish(&mut self) -> Option<SseMessage> {
        if !self.line_buf.is_empty() {
            let line = String::from_utf8_lossy(&self.line_buf).into_owned();
            self.line_buf.clear();
            let mut out = Vec::new();
            self.process_line(line.strip_suffix('\r').unwrap_or(&line), &mut out);
            if let Some(msg) = out.into_iter().next() {
                return Some(msg);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<SseMessage>) {
        if line.is_empty() {
            if let Some(msg) = self.dispatch() {
                out.push(msg);
            }
            return;
        }

        // Comment / keepalive
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.find(':') {
            Some(pos) => {
                let value = &line[pos + 1..];
                // One leading space after the colon is not part of the value
                (&line[..pos], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = Some(value.to_string());
                }
            }
            "retry" => {}
            _ => {}
        }
    }

    /// Dispatch the accumulated message, if any, and reset per-message state
    fn dispatch(&mut self) -> Option<SseMessage> {
        if self.data.is_empty() {
            // Nothing to dispatch; the event type still resets
            self.event = None;
            return None;
        }

        let msg = SseMessage {
            event: self.event.take().unwrap_or_else(|| "message".to_string()),
            data: self.data.join("\n"),
            id: self.last_event_id.clone(),
        };
        self.data.clear();
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse_all(input: &str) -> Vec<SseMessage> {
        let mut parser = SseParser::new();
        let mut msgs = parser.feed(input.as_bytes());
        if let Some(last) = parser.finish() {
            msgs.push(last);
        }
        msgs
    }

    #[test]
    fn test_single_message() {
        let msgs = parse_all("data: hello\n\n");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].event, "message");
        assert_eq!(msgs[0].data, "hello");
        assert!(msgs[0].id.is_none());
    }

    #[test]
    fn test_multiline_data_joined() {
        let msgs = parse_all("data: line one\ndata: line two\ndata: line three\n\n");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].data, "line one\nline two\nline three");
    }

    #[test]
    fn test_event_type() {
        let msgs = parse_all("event: delta\ndata: {}\n\n");
        assert_eq!(msgs[0].event, "delta");
    }

    #[test]
    fn test_event_type_resets_between_messages() {
        let msgs = parse_all("event: delta\ndata: a\n\ndata: b\n\n");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].event, "delta");
        assert_eq!(msgs[1].event, "message");
    }

    #[test]
    fn test_comments_ignored() {
        let msgs = parse_all(": keepalive\ndata: real\n: another comment\n\n");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].data, "real");
    }

    #[test]
    fn test_id_tracked() {
        let msgs = parse_all("id: 42\ndata: a\n\ndata: b\n\n");
        assert_eq!(msgs[0].id.as_deref(), Some("42"));
        // The id persists across messages until replaced
        assert_eq!(msgs[1].id.as_deref(), Some("42"));
    }

    #[test]
    fn test_id_with_nul_ignored() {
        let mut parser = SseParser::new();
        parser.feed(b"id: ok\n");
        parser.feed(b"id: bad\0id\n");
        assert_eq!(parser.last_event_id(), Some("ok"));
    }

    #[test]
    fn test_retry_ignored() {
        let msgs = parse_all("retry: 3000\ndata: x\n\n");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].data, "x");
    }

    #[test]
    fn test_blank_line_without_data_dispatches_nothing() {
        let msgs = parse_all("event: ping\n\n");
        assert!(msgs.is_empty());
    }

    #[test]
    fn test_no_space_after_colon() {
        let msgs = parse_all("data:tight\n\n");
        assert_eq!(msgs[0].data, "tight");
    }

    #[test]
    fn test_only_first_space_stripped() {
        let msgs = parse_all("data:  two spaces\n\n");
        assert_eq!(msgs[0].data, " two spaces");
    }

    #[test]
    fn test_crlf_line_endings() {
        let msgs = parse_all("data: hello\r\n\r\n");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].data, "hello");
    }

    #[test]
    fn test_field_without_colon() {
        // A bare field name is a field with an empty value
        let msgs = parse_all("data\ndata: x\n\n");
        assert_eq!(msgs[0].data, "\nx");
    }

    #[test]
    fn test_unterminated_final_message_flushed() {
        let mut parser = SseParser::new();
        let msgs = parser.feed(b"data: trailing");
        assert!(msgs.is_empty());
        let last = parser.finish().unwrap();
        assert_eq!(last.data, "trailing");
    }

    #[test]
    fn test_chunk_split_mid_line() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"da").is_empty());
        assert!(parser.feed(b"ta: hel").is_empty());
        assert!(parser.feed(b"lo\n").is_empty());
        let msgs = parser.feed(b"\n");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].data, "hello");
    }

    #[test]
    fn test_chunk_split_mid_utf8() {
        // "héllo" with the two-byte é split across chunks
        let bytes = "data: h\u{e9}llo\n\n".as_bytes();
        let split = bytes.iter().position(|&b| b >= 0x80).unwrap() + 1;
        let mut parser = SseParser::new();
        let mut msgs = parser.feed(&bytes[..split]);
        msgs.extend(parser.feed(&bytes[split..]));
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].data, "h\u{e9}llo");
    }

    proptest! {
        /// An arbitrary chunk-boundary split of one logical byte stream
        /// yields the same message sequence as single-chunk delivery.
        #[test]
        fn prop_chunking_invariant(split in 0usize..200) {
            let stream = b": comment\nevent: delta\ndata: first\ndata: second\n\nid: 7\ndata: third\n\n";
            let split = split.min(stream.len());

            let mut whole = SseParser::new();
            let expected = whole.feed(stream);

            let mut parser = SseParser::new();
            let mut got = parser.feed(&stream[..split]);
            got.extend(parser.feed(&stream[split..]));

            prop_assert_eq!(got, expected);
        }
    }
}
