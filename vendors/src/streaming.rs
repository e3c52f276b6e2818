//! Streaming response processing for OpenAI-compatible completion APIs.
//!
//! Chat completion streams arrive as Server-Sent Events whose `data:`
//! payloads are JSON chunks, terminated by `data: [DONE]`.

use std::time::{Duration, Instant};

use serde_json::Value;
use tokenbench_core::VendorError;

// ============================================================================
// SSE Parser
// ============================================================================

/// Largest amount of undelimited data held while waiting for an event boundary.
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// One Server-Sent Event of interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// `data:` payload (multiple data lines joined with `\n`)
    Data(String),
    /// End of stream marker (`[DONE]`)
    Done,
}

/// Incremental SSE parser.
///
/// Bytes may be split anywhere, including inside a UTF-8 character or a
/// `\r\n` pair; incomplete events stay buffered as raw bytes until the blank
/// line that ends them arrives.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every event completed by them.
    ///
    /// Fails when more than 1MB accumulates without an event boundary.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>, VendorError> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some((end, delimiter)) = next_boundary(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + delimiter).collect();
            events.extend(parse_block(&String::from_utf8_lossy(&block[..end])));
        }

        if self.buffer.len() > MAX_BUFFER_SIZE {
            let size = self.buffer.len();
            self.buffer.clear();
            return Err(VendorError::Stream(format!(
                "event exceeded {MAX_BUFFER_SIZE} bytes without a boundary ({size} buffered)"
            )));
        }

        Ok(events)
    }

    /// Whether part of an event is still buffered.
    pub fn has_buffered_data(&self) -> bool {
        self.buffer.iter().any(|b| !b.is_ascii_whitespace())
    }
}

/// Start and length of the first blank-line delimiter (`\n\n` or `\r\n\r\n`).
fn next_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let find = |needle: &[u8]| {
        buffer
            .windows(needle.len())
            .position(|window| window == needle)
            .map(|at| (at, needle.len()))
    };
    match (find(b"\n\n"), find(b"\r\n\r\n")) {
        (Some(lf), Some(crlf)) => Some(if lf.0 <= crlf.0 { lf } else { crlf }),
        (lf, crlf) => lf.or(crlf),
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let data: Vec<&str> = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    if data.is_empty() {
        // comments, keep-alives and event/id-only blocks
        return None;
    }

    let data = data.join("\n");
    if data.trim() == "[DONE]" {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(data))
    }
}

// ============================================================================
// Chunk decoding
// ============================================================================

/// Generated text carried by one streamed chunk.
///
/// Reads `choices[0].delta.content` (chat) or `choices[0].text` (completions).
pub fn extract_content(value: &Value) -> Option<&str> {
    let choice = value.get("choices")?.get(0)?;
    choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .or_else(|| choice.get("text"))
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
}

/// Error object embedded in a streamed chunk, if any.
pub fn extract_error(value: &Value) -> Option<VendorError> {
    let error = value.get("error")?;
    if error.is_null() {
        return None;
    }

    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    let status = error
        .get("code")
        .and_then(|code| code.as_u64().or_else(|| code.as_str()?.parse().ok()))
        .and_then(|code| u16::try_from(code).ok())
        .filter(|code| (400..600).contains(code));

    Some(match status {
        Some(status) => VendorError::Status {
            status,
            body: message,
        },
        None => VendorError::Stream(message),
    })
}

// ============================================================================
// Token timing
// ============================================================================

/// Latency bookkeeping for one streamed response.
///
/// The first content chunk fixes time to first token; every later chunk adds
/// the gap since the previous one to the inter-token sum.
#[derive(Debug, Clone)]
pub struct StreamTimer {
    start: Instant,
    first: Option<Instant>,
    last: Option<Instant>,
    gap_sum: Duration,
    chunks: usize,
}

impl StreamTimer {
    /// Start timing at `start` (just before the request is sent).
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            first: None,
            last: None,
            gap_sum: Duration::ZERO,
            chunks: 0,
        }
    }

    /// Record a content chunk received at `at`.
    pub fn on_content(&mut self, at: Instant) {
        match self.last {
            None => self.first = Some(at),
            Some(last) => self.gap_sum += at.saturating_duration_since(last),
        }
        self.last = Some(at);
        self.chunks += 1;
    }

    /// Time to first token in seconds.
    pub fn ttft_s(&self) -> Option<f64> {
        self.first
            .map(|first| first.saturating_duration_since(self.start).as_secs_f64())
    }

    /// Sum of gaps between content chunks in seconds.
    pub fn inter_token_sum_s(&self) -> f64 {
        self.gap_sum.as_secs_f64()
    }

    /// Content chunks seen so far.
    pub fn chunks(&self) -> usize {
        self.chunks
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sse_parser_basic() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: {\"content\": \"hello\"}\n\n").unwrap();
        assert_eq!(events, vec![SseEvent::Data("{\"content\": \"hello\"}".into())]);
    }

    #[test]
    fn test_sse_parser_done() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: {\"n\": 1}\n\ndata: [DONE]\n\n").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], SseEvent::Done);
    }

    #[test]
    fn test_sse_parser_split_across_feeds() {
        let mut parser = SseParser::new();

        assert!(parser.feed(b"data: {\"content\":").unwrap().is_empty());
        assert!(parser.has_buffered_data());

        let events = parser.feed(b" \"hi\"}\n").unwrap();
        assert!(events.is_empty());

        let events = parser.feed(b"\n").unwrap();
        assert_eq!(events, vec![SseEvent::Data("{\"content\": \"hi\"}".into())]);
        assert!(!parser.has_buffered_data());
    }

    #[test]
    fn test_sse_parser_crlf_and_comments() {
        let mut parser = SseParser::new();
        let events = parser
            .feed(b": keep-alive\r\n\r\nevent: message\r\ndata:abc\r\n\r\n")
            .unwrap();
        assert_eq!(events, vec![SseEvent::Data("abc".into())]);
    }

    #[test]
    fn test_sse_parser_split_utf8_character() {
        let mut parser = SseParser::new();
        let payload = "data: {\"choices\": [{\"delta\": {\"content\": \"é\"}}]}\n\n".as_bytes();
        let split = payload.iter().position(|&b| b == 0xC3).unwrap() + 1;

        assert!(parser.feed(&payload[..split]).unwrap().is_empty());
        let events = parser.feed(&payload[split..]).unwrap();

        let SseEvent::Data(data) = &events[0] else {
            panic!("expected data event, got {events:?}");
        };
        let value: Value = serde_json::from_str(data).unwrap();
        assert_eq!(extract_content(&value), Some("é"));
    }

    #[test]
    fn test_sse_parser_split_crlf() {
        let mut parser = SseParser::new();

        assert!(parser.feed(b"data: first\r").unwrap().is_empty());
        assert!(parser.feed(b"\n\r").unwrap().is_empty());
        let events = parser.feed(b"\ndata: second\r\n\r\n").unwrap();

        assert_eq!(
            events,
            vec![
                SseEvent::Data("first".into()),
                SseEvent::Data("second".into())
            ]
        );
    }

    #[test]
    fn test_sse_parser_multiline_data() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: line1\ndata: line2\n\n").unwrap();
        assert_eq!(events, vec![SseEvent::Data("line1\nline2".into())]);
    }

    #[test]
    fn test_sse_parser_rejects_unbounded_event() {
        let mut parser = SseParser::new();
        let junk = vec![b'x'; MAX_BUFFER_SIZE + 1];
        assert!(matches!(parser.feed(&junk), Err(VendorError::Stream(_))));
        assert!(!parser.has_buffered_data());
    }

    #[test]
    fn test_extract_content_chat_and_text() {
        let chat = json!({"choices": [{"delta": {"content": "Hel"}}]});
        assert_eq!(extract_content(&chat), Some("Hel"));

        let completion = json!({"choices": [{"text": "lo"}]});
        assert_eq!(extract_content(&completion), Some("lo"));

        let role_only = json!({"choices": [{"delta": {"role": "assistant"}}]});
        assert_eq!(extract_content(&role_only), None);

        let empty = json!({"choices": [{"delta": {"content": ""}}]});
        assert_eq!(extract_content(&empty), None);

        assert_eq!(extract_content(&json!({"choices": []})), None);
    }

    #[test]
    fn test_extract_error() {
        let with_code = json!({"error": {"message": "too many", "code": 429}});
        assert!(matches!(
            extract_error(&with_code),
            Some(VendorError::Status { status: 429, .. })
        ));

        let string_code = json!({"error": {"message": "bad", "code": "400"}});
        assert!(matches!(
            extract_error(&string_code),
            Some(VendorError::Status { status: 400, .. })
        ));

        let no_code = json!({"error": {"message": "model crashed"}});
        match extract_error(&no_code) {
            Some(VendorError::Stream(message)) => assert_eq!(message, "model crashed"),
            other => panic!("expected stream error, got {other:?}"),
        }

        assert!(extract_error(&json!({"error": null})).is_none());
        assert!(extract_error(&json!({"choices": []})).is_none());
    }

    #[test]
    fn test_stream_timer() {
        let start = Instant::now();
        let mut timer = StreamTimer::new(start);
        assert_eq!(timer.ttft_s(), None);

        timer.on_content(start + Duration::from_millis(200));
        timer.on_content(start + Duration::from_millis(250));
        timer.on_content(start + Duration::from_millis(330));

        assert!((timer.ttft_s().unwrap() - 0.2).abs() < 1e-9);
        assert!((timer.inter_token_sum_s() - 0.13).abs() < 1e-9);
        assert_eq!(timer.chunks(), 3);
    }
}
