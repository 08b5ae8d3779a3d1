//! Incremental decoding of OpenAI-compatible SSE bodies.
//!
//! [`SseDecoder`] buffers raw bytes across network reads and only decodes
//! complete lines. A newline byte can never occur inside a multi-byte UTF-8
//! sequence, so a character split across two reads is reassembled before it
//! is decoded.
//!
//! The space after `data:` is optional, so `data:[DONE]` ends a stream the
//! same way `data: [DONE]` does.

use super::openai;

/// Maximum bytes buffered for a single unterminated line.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Output of the decoder for one complete `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Non-empty delta text.
    Fragment(String),
    /// The `data: [DONE]` sentinel.
    Done,
}

/// Line-buffered SSE decoder scoped to one upstream response.
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Whether `[DONE]` has been seen. Later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one chunk of bytes and return the events of every line it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.process_line(&line[..line.len() - 1]) {
                let is_done = event == SseEvent::Done;
                events.push(event);
                if is_done {
                    self.buffer.clear();
                    return events;
                }
            }
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            tracing::warn!(
                buffered = self.buffer.len(),
                "SSE line exceeded buffer cap, discarding"
            );
            self.buffer.clear();
        }

        events
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if self.done || self.buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        self.process_line(&line).into_iter().collect()
    }

    fn process_line(&mut self, raw: &[u8]) -> Option<SseEvent> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);

        // event:, id:, retry: and ":" comment lines carry nothing we relay
        let data = line.strip_prefix("data:")?;
        let data = data.strip_prefix(' ').unwrap_or(data).trim_end();

        if data == "[DONE]" {
            self.done = true;
            return Some(SseEvent::Done);
        }

        match openai::delta_content(data) {
            Ok(Some(text)) => Some(SseEvent::Fragment(text)),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(error = %e, line = %data, "Skipping unparseable SSE data line");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(content: &str) -> String {
        format!(
            r#"data: {{"id":"c1","choices":[{{"index":0,"delta":{{"content":{}}},"finish_reason":null}}]}}"#,
            serde_json::to_string(content).unwrap()
        )
    }

    /// Join events with `\n\n` and split the bytes at the given positions.
    fn split_sse_at_positions(events: &[String], split_positions: &[usize]) -> Vec<Vec<u8>> {
        let full: Vec<u8> = events
            .iter()
            .flat_map(|e| format!("{}\n\n", e).into_bytes())
            .collect();

        let mut chunks = Vec::new();
        let mut prev = 0;
        for &pos in split_positions {
            if pos > prev && pos < full.len() {
                chunks.push(full[prev..pos].to_vec());
                prev = pos;
            }
        }
        chunks.push(full[prev..].to_vec());
        chunks
    }

    fn fragments(events: &[SseEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                SseEvent::Fragment(t) => Some(t.as_str()),
                SseEvent::Done => None,
            })
            .collect()
    }

    #[test]
    fn test_single_chunk_full_stream() {
        let events = [delta("Hel"), delta("lo"), "data: [DONE]".to_string()];
        let chunks = split_sse_at_positions(&events, &[]);

        let mut decoder = SseDecoder::new();
        let out = decoder.push(&chunks[0]);

        assert_eq!(
            out,
            vec![
                SseEvent::Fragment("Hel".to_string()),
                SseEvent::Fragment("lo".to_string()),
                SseEvent::Done
            ]
        );
        assert!(decoder.is_done());
    }

    #[test]
    fn test_line_split_across_chunks() {
        let events = [delta("Hello"), delta(" world"), "data: [DONE]".to_string()];
        let chunks = split_sse_at_positions(&events, &[20, 75, 110]);
        assert!(chunks.len() > 1);

        let mut decoder = SseDecoder::new();
        let mut out = Vec::new();
        for chunk in &chunks {
            out.extend(decoder.push(chunk));
        }

        assert_eq!(fragments(&out), vec!["Hello", " world"]);
        assert_eq!(out.last(), Some(&SseEvent::Done));
    }

    #[test]
    fn test_multibyte_char_split_at_chunk_boundary() {
        let line = format!("{}\n\n", delta("héllo 🌍"));
        let bytes = line.as_bytes();
        // Split in the middle of the 4-byte emoji
        let emoji_start = line.find('🌍').unwrap();
        let split = emoji_start + 2;

        let mut decoder = SseDecoder::new();
        let first = decoder.push(&bytes[..split]);
        assert!(first.is_empty(), "incomplete line must not be emitted");
        let second = decoder.push(&bytes[split..]);

        assert_eq!(fragments(&second), vec!["héllo 🌍"]);
    }

    #[test]
    fn test_two_byte_char_split_at_chunk_boundary() {
        let line = format!("{}\n", delta("é"));
        let bytes = line.as_bytes();
        let split = line.find('é').unwrap() + 1;

        let mut decoder = SseDecoder::new();
        let mut out = decoder.push(&bytes[..split]);
        out.extend(decoder.push(&bytes[split..]));

        assert_eq!(fragments(&out), vec!["é"]);
    }

    #[test]
    fn test_malformed_json_skipped() {
        let events = [
            delta("a"),
            "data: not-json".to_string(),
            delta("b"),
            "data: [DONE]".to_string(),
        ];
        let chunks = split_sse_at_positions(&events, &[]);

        let mut decoder = SseDecoder::new();
        let out = decoder.push(&chunks[0]);

        assert_eq!(fragments(&out), vec!["a", "b"]);
        assert!(decoder.is_done());
    }

    #[test]
    fn test_done_ignores_later_bytes() {
        let events = [delta("kept"), "data: [DONE]".to_string(), delta("dropped")];
        let chunks = split_sse_at_positions(&events, &[]);

        let mut decoder = SseDecoder::new();
        let out = decoder.push(&chunks[0]);
        assert_eq!(fragments(&out), vec!["kept"]);

        assert!(decoder.push(delta("late").as_bytes()).is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_non_data_fields_and_empty_deltas_skipped() {
        let raw = b"event: message\nid: 123\nretry: 5000\n: keep-alive\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n";

        let mut decoder = SseDecoder::new();
        let out = decoder.push(raw);
        assert_eq!(out, vec![SseEvent::Fragment("Hi".to_string())]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let raw = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\r\n\r\ndata: [DONE]\r\n\r\n";

        let mut decoder = SseDecoder::new();
        let out = decoder.push(raw);
        assert_eq!(
            out,
            vec![SseEvent::Fragment("Hi".to_string()), SseEvent::Done]
        );
    }

    #[test]
    fn test_data_without_space() {
        let raw = b"data:{\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata:[DONE]\n\n";

        let mut decoder = SseDecoder::new();
        let out = decoder.push(raw);
        assert_eq!(
            out,
            vec![SseEvent::Fragment("Hi".to_string()), SseEvent::Done]
        );
    }

    #[test]
    fn test_done_without_trailing_newline() {
        let raw = format!("{}\n\ndata: [DONE]", delta("Hi"));

        let mut decoder = SseDecoder::new();
        let out = decoder.push(raw.as_bytes());
        assert_eq!(fragments(&out), vec!["Hi"]);
        assert!(!decoder.is_done());

        assert_eq!(decoder.finish(), vec![SseEvent::Done]);
        assert!(decoder.is_done());
    }

    #[test]
    fn test_empty_stream() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.finish().is_empty());
        assert!(!decoder.is_done());
    }

    #[test]
    fn test_buffer_cap() {
        let huge_chunk = vec![b'x'; 65 * 1024];

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&huge_chunk).is_empty());

        // The oversized partial line was dropped; its tail ends at the next newline
        let mut out = decoder.push(b"\n");
        out.extend(decoder.push(format!("{}\n\ndata: [DONE]\n\n", delta("ok")).as_bytes()));
        assert_eq!(fragments(&out), vec!["ok"]);
        assert!(decoder.is_done());
    }
}
