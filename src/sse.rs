//! Incremental Server-Sent Events decoding
//!
//! Used by the hosted backend in streaming mode and by the gateway client's
//! event stream. Bytes are buffered until a blank line closes an event, so
//! chunk boundaries (including ones that split a UTF-8 sequence) do not
//! matter.

use bytes::Bytes;
use futures::{Stream, StreamExt};

/// One decoded SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if any
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Stateful decoder fed with raw body chunks
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(pos) = find_blank_line(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_block(&block[..pos]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let block = std::mem::take(&mut self.buffer);
        parse_block(&block)
    }
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_block(block: &[u8]) -> Option<SseEvent> {
    let text = String::from_utf8_lossy(block);
    let mut data_lines: Vec<&str> = Vec::new();
    let mut event: Option<String> = None;

    for line in text.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim());
        } else if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_string());
        }
        // `id:`, `retry:` and `:` comment lines are ignored.
    }

    if data_lines.is_empty() {
        return None;
    }

    Some(SseEvent {
        event,
        data: data_lines.join("\n"),
    })
}

/// Drive `byte_stream` to completion, calling `on_event` for each event.
///
/// Stops early when `on_event` returns `false`. A transport error ends the
/// stream and is returned to the caller; events decoded before it have
/// already been delivered.
pub async fn for_each_event<S, F>(byte_stream: S, mut on_event: F) -> Result<(), reqwest::Error>
where
    S: Stream<Item = reqwest::Result<Bytes>>,
    F: FnMut(SseEvent) -> bool,
{
    let mut decoder = SseDecoder::new();
    tokio::pin!(byte_stream);

    while let Some(chunk) = byte_stream.next().await {
        for event in decoder.push(&chunk?) {
            if !on_event(event) {
                return Ok(());
            }
        }
    }

    if let Some(event) = decoder.finish() {
        on_event(event);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"a\":1}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: None,
                data: "{\"a\":1}".to_string()
            }]
        );
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: message\nda").is_empty());
        let events = decoder.push(b"ta: hello\n\ndata: second\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event.as_deref(), Some("message"));
        assert_eq!(events[0].data, "hello");
        assert_eq!(events[1].data, "second");
    }

    #[test]
    fn test_crlf_delimiters() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: one\r\n\r\ndata: two\r\n\r\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].data, "two");
    }

    #[test]
    fn test_multibyte_split() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: 🥺\n\n".as_bytes();
        assert!(decoder.push(&bytes[..8]).is_empty());
        let events = decoder.push(&bytes[8..]);
        assert_eq!(events[0].data, "🥺");
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: a\ndata: b\n\n");
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn test_comment_only_block_ignored() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b": keep-alive\n\n").is_empty());
    }

    #[test]
    fn test_finish_flushes_trailing_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish().unwrap().data, "[DONE]");
        assert!(decoder.finish().is_none());
    }

    #[tokio::test]
    async fn test_for_each_event_stops_early() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: first\n\n")),
            Ok(Bytes::from_static(b"data: stop\n\ndata: never\n\n")),
        ];
        let mut seen = Vec::new();
        for_each_event(futures::stream::iter(chunks), |event| {
            let keep_going = event.data != "stop";
            seen.push(event.data);
            keep_going
        })
        .await
        .unwrap();
        assert_eq!(seen, vec!["first", "stop"]);
    }
}
