//! Incremental `text/event-stream` framing.
//!
//! Only the `data` field matters to the chat endpoint; `event`, `id`, `retry`
//! and comment lines are accepted and ignored.

/// Splits a byte stream into server-sent event `data` payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes and returns every event completed by them, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line = self.buffer.drain(..=newline).collect::<Vec<_>>();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if let Some(event) = self.process_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }

        events
    }

    /// Flushes a trailing event the server closed without a blank line.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&line);
            let line = line.strip_suffix('\r').unwrap_or(&line).to_string();
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }

        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            self.data_lines.push(value.to_string());
        }

        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            return None;
        }

        Some(std::mem::take(&mut self.data_lines).join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_split_across_pushes_are_reassembled() {
        let mut decoder = SseDecoder::new();

        assert!(decoder.push(b"data: {\"type\":\"con").is_empty());
        assert!(decoder.push(b"tent\",\"content\":\"Hel\"}\n").is_empty());
        let events = decoder.push(b"\ndata: {\"type\":\"content\",\"content\":\"lo\"}\n\n");

        assert_eq!(
            events,
            vec![
                r#"{"type":"content","content":"Hel"}"#.to_string(),
                r#"{"type":"content","content":"lo"}"#.to_string(),
            ]
        );
    }

    #[test]
    fn crlf_comments_and_multiline_data_are_handled() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\r\nevent: chunk\r\ndata: first\r\ndata:second\r\n\r\n");

        assert_eq!(events, vec!["first\nsecond".to_string()]);
    }

    #[test]
    fn utf8_sequences_split_between_pushes_survive() {
        let mut decoder = SseDecoder::new();
        let payload = "data: 你好\n\n".as_bytes();
        let (head, tail) = payload.split_at(8);

        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec!["你好".to_string()]);
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), Some("tail".to_string()));
        assert_eq!(decoder.finish(), None);
    }
}
