// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log capturer: turns the raw output stream into ordered events.
//!
//! Bytes are split on newlines; a final unterminated fragment at
//! end-of-stream is emitted as one event. Every event gets a wall-clock
//! timestamp at the moment of observation (clamped so the sequence never
//! goes backwards across a clock step) and a sequence number starting at
//! 0. Pushes into the event buffer suspend when it is full, so a slow
//! shipping path slows capture instead of losing data.

use chrono::Utc;
use tracing::{debug, warn};

use crate::buffer::EventBuffer;
use crate::constants;
use crate::error::ShipperError;
use crate::event::LogEvent;
use crate::runner::OutputStream;

pub struct LogCapturer {
    buffer: EventBuffer,
    next_seq: u64,
    last_timestamp_ms: i64,
    pending: Vec<u8>,
}

impl LogCapturer {
    #[must_use]
    pub fn new(buffer: EventBuffer) -> Self {
        LogCapturer {
            buffer,
            next_seq: 0,
            last_timestamp_ms: 0,
            pending: Vec::new(),
        }
    }

    /// Consumes the stream to end-of-stream, producing events into the
    /// buffer. Closes the buffer on the way out — also on error, so
    /// everything captured up to the failure still ships.
    ///
    /// Returns the number of events captured.
    pub async fn run(mut self, mut output: OutputStream) -> Result<u64, ShipperError> {
        let result = self.consume(&mut output).await;
        self.buffer.close();
        result.map(|()| self.next_seq)
    }

    async fn consume(&mut self, output: &mut OutputStream) -> Result<(), ShipperError> {
        while let Some(chunk) = output.next_chunk().await {
            let chunk = chunk.map_err(ShipperError::StreamRead)?;
            self.ingest(&chunk).await;
        }
        if !self.pending.is_empty() {
            // Unterminated final line: still a valid event.
            self.emit_line().await;
        }
        Ok(())
    }

    async fn ingest(&mut self, chunk: &[u8]) {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            rest = &rest[pos + 1..];
            self.emit_line().await;
        }
        self.pending.extend_from_slice(rest);
    }

    async fn emit_line(&mut self) {
        let mut raw = std::mem::take(&mut self.pending);
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }

        let mut message = String::from_utf8_lossy(&raw).into_owned();
        if message.len() > constants::MAX_EVENT_BYTES {
            let mut cut = constants::MAX_EVENT_BYTES;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
            warn!(
                seq = self.next_seq,
                "captured line exceeds {} bytes, truncating",
                constants::MAX_EVENT_BYTES
            );
        }
        if message.is_empty() {
            // The sink rejects blank messages; an empty line still ships,
            // as a single space.
            message.push(' ');
        }

        let timestamp_ms = Utc::now().timestamp_millis().max(self.last_timestamp_ms);
        self.last_timestamp_ms = timestamp_ms;

        debug!(seq = self.next_seq, "container log: {message}");

        let event = LogEvent {
            timestamp_ms,
            seq: self.next_seq,
            message,
        };
        self.next_seq += 1;
        self.buffer.push(event).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::buffer::{DrainLimits, OverflowPolicy};
    use std::io;
    use std::time::Duration;

    fn drain_all_limits() -> DrainLimits {
        DrainLimits {
            max_events: 1_000,
            max_bytes: usize::MAX,
            max_wait: Duration::from_millis(10),
        }
    }

    async fn capture_chunks(chunks: Vec<io::Result<Vec<u8>>>) -> (Result<u64, ShipperError>, Vec<LogEvent>) {
        let buffer = EventBuffer::new(1_000, OverflowPolicy::Block);
        let capturer = LogCapturer::new(buffer.clone());
        let result = capturer.run(OutputStream::from_chunks(chunks)).await;

        let mut events = Vec::new();
        loop {
            let drained = buffer.drain(&drain_all_limits()).await;
            if drained.is_empty() {
                break;
            }
            events.extend(drained);
        }
        (result, events)
    }

    fn messages(events: &[LogEvent]) -> Vec<&str> {
        events.iter().map(|e| e.message.as_str()).collect()
    }

    #[tokio::test]
    async fn test_splits_lines_and_sequences() {
        let (result, events) = capture_chunks(vec![Ok(b"a\nb\nc\n".to_vec())]).await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(messages(&events), vec!["a", "b", "c"]);
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_line_split_across_chunks() {
        let (result, events) =
            capture_chunks(vec![Ok(b"hel".to_vec()), Ok(b"lo\nworld\n".to_vec())]).await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(messages(&events), vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn test_final_fragment_is_an_event() {
        let (result, events) = capture_chunks(vec![Ok(b"done\npartial".to_vec())]).await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(messages(&events), vec!["done", "partial"]);
    }

    #[tokio::test]
    async fn test_crlf_stripped() {
        let (_, events) = capture_chunks(vec![Ok(b"line\r\n".to_vec())]).await;

        assert_eq!(messages(&events), vec!["line"]);
    }

    #[tokio::test]
    async fn test_empty_line_ships_as_space() {
        let (result, events) = capture_chunks(vec![Ok(b"a\n\nb\n".to_vec())]).await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(messages(&events), vec!["a", " ", "b"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let (_, events) = capture_chunks(vec![Ok(b"ok \xff\xfe\n".to_vec())]).await;

        assert_eq!(events.len(), 1);
        assert!(events[0].message.starts_with("ok "));
    }

    #[tokio::test]
    async fn test_timestamps_non_decreasing() {
        let (_, events) = capture_chunks(vec![Ok(b"a\nb\nc\nd\n".to_vec())]).await;

        for pair in events.windows(2) {
            assert!(pair[1].timestamp_ms >= pair[0].timestamp_ms);
        }
    }

    #[tokio::test]
    async fn test_read_error_keeps_earlier_events() {
        let chunks = vec![
            Ok(b"first\n".to_vec()),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe broke")),
        ];
        let (result, events) = capture_chunks(chunks).await;

        assert!(matches!(result, Err(ShipperError::StreamRead(_))));
        assert_eq!(messages(&events), vec!["first"]);
    }

    #[tokio::test]
    async fn test_oversized_line_truncated() {
        let big = vec![b'x'; constants::MAX_EVENT_BYTES + 100];
        let mut chunk = big.clone();
        chunk.push(b'\n');
        let (_, events) = capture_chunks(vec![Ok(chunk)]).await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message.len(), constants::MAX_EVENT_BYTES);
    }
}
