// SSE (Server-Sent Events) framing
//
// The ask endpoint streams its answer as `text/event-stream`. Network chunks
// do not respect line boundaries, so bytes are buffered until a full line is
// available and lines are folded into frames:
// ```
// event: <kind>          (optional)
// data: <payload>        (one or more, joined with '\n')
// <blank line>           (frame terminator)
// ```
// Some deployments skip SSE and send one JSON object per line instead; a
// line that starts with `{` is treated as a complete frame on its own.

use bytes::BytesMut;

/// One decoded SSE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if the frame had one
    pub event: Option<String>,
    /// Concatenated `data:` lines
    pub data: String,
}

/// Check if a response is SSE based on content-type header
pub fn is_sse_response(headers: &reqwest::header::HeaderMap) -> bool {
    headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("text/event-stream"))
        .unwrap_or(false)
}

/// Incremental line buffer + frame assembler
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw network chunk, returning every frame it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush whatever is left once the body ends (a final frame is often not
    /// followed by a blank line)
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            let rest = String::from_utf8_lossy(&rest);
            let rest = rest.trim_end_matches(['\n', '\r']).to_string();
            if let Some(frame) = self.process_line(&rest) {
                return Some(frame);
            }
        }
        self.take_frame()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.take_frame();
        }

        // Comment / keep-alive
        if line.starts_with(':') {
            return None;
        }

        // JSON-lines framing
        if line.starts_with('{') && self.data.is_empty() {
            return Some(SseFrame {
                event: self.event.take(),
                data: line.to_string(),
            });
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id / retry carry nothing the answer stream needs
            "id" | "retry" => {}
            other => tracing::trace!("Ignoring unknown SSE field: {}", other),
        }
        None
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() {
            // An event name without data is not dispatched
            self.event = None;
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: self.event.take(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: sta").is_empty());
        assert!(decoder.feed(b"tus\ndata: Thinking").is_empty());
        let frames = decoder.feed(b"...\n\ndata: {\"type\":\"done\"}\n\n");

        assert_eq!(
            frames,
            vec![
                SseFrame {
                    event: Some("status".to_string()),
                    data: "Thinking...".to_string(),
                },
                SseFrame {
                    event: None,
                    data: "{\"type\":\"done\"}".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_crlf_comments_and_multiline_data() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b": keep-alive\r\ndata: line one\r\ndata: line two\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "line one\nline two");
    }

    #[test]
    fn test_multibyte_char_split_between_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: héllo\n\n".as_bytes();
        // Split inside the two-byte 'é'
        assert!(decoder.feed(&bytes[..8]).is_empty());
        let frames = decoder.feed(&bytes[8..]);
        assert_eq!(frames[0].data, "héllo");
    }

    #[test]
    fn test_finish_flushes_unterminated_frame() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: tail").is_empty());
        let frame = decoder.finish().expect("trailing frame");
        assert_eq!(frame.data, "tail");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_json_lines_framing() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"{\"type\":\"status\",\"content\":\"Running SQL...\"}\n");
        assert_eq!(frames.len(), 1);
        assert!(frames[0].event.is_none());
    }

    #[test]
    fn test_event_without_data_is_dropped() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: ping\n\n").is_empty());
        let frames = decoder.feed(b"data: x\n\n");
        assert_eq!(frames[0].event, None);
    }
}
