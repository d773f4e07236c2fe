// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log events and batches.
//!
//! A [`LogEvent`] is one captured line (or final fragment) of workload
//! output. Events are totally ordered by `seq` within a run, and their
//! timestamps are non-decreasing by construction (the capturer clamps
//! wall-clock regressions). A [`Batch`] is an ordered run of events that
//! fits a single append call; once formed it is delivered atomically or
//! dropped atomically, never split.

use crate::constants;

/// One captured line of workload output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Wall-clock milliseconds since the Unix epoch, stamped at the moment
    /// the line was observed (emission time inside the workload is
    /// unknowable).
    pub timestamp_ms: i64,
    /// Position in the capture order, starting at 0.
    pub seq: u64,
    /// The line content, without its trailing newline.
    pub message: String,
}

impl LogEvent {
    /// Bytes this event contributes to a batch payload, including the
    /// fixed per-event overhead the service charges.
    #[must_use]
    pub fn payload_bytes(&self) -> usize {
        self.message.len() + constants::EVENT_OVERHEAD_BYTES
    }
}

/// Bounds a single batch must respect.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub max_events: usize,
    pub max_bytes: usize,
    pub max_span_ms: i64,
}

impl Default for BatchLimits {
    fn default() -> Self {
        BatchLimits {
            max_events: constants::MAX_BATCH_EVENTS,
            max_bytes: constants::MAX_BATCH_BYTES,
            max_span_ms: constants::MAX_BATCH_SPAN_MS,
        }
    }
}

/// An ordered, bound-respecting group of events for one append call.
#[derive(Debug, Clone)]
pub struct Batch {
    events: Vec<LogEvent>,
    payload_bytes: usize,
}

impl Batch {
    /// Splits `events` (already in `seq` order) into as many batches as
    /// the limits require, preserving order.
    ///
    /// Timestamps are clamped to be non-decreasing across the run as a
    /// final guard before the wire: the service rejects out-of-order
    /// events within a batch.
    #[must_use]
    pub fn pack(events: Vec<LogEvent>, limits: &BatchLimits) -> Vec<Batch> {
        let mut batches = Vec::new();
        let mut current = Batch {
            events: Vec::new(),
            payload_bytes: 0,
        };
        let mut last_timestamp = i64::MIN;

        for mut event in events {
            if event.timestamp_ms < last_timestamp {
                event.timestamp_ms = last_timestamp;
            }
            last_timestamp = event.timestamp_ms;

            if !current.fits(&event, limits) {
                batches.push(std::mem::replace(
                    &mut current,
                    Batch {
                        events: Vec::new(),
                        payload_bytes: 0,
                    },
                ));
            }
            current.payload_bytes += event.payload_bytes();
            current.events.push(event);
        }

        if !current.events.is_empty() {
            batches.push(current);
        }
        batches
    }

    fn fits(&self, event: &LogEvent, limits: &BatchLimits) -> bool {
        if self.events.is_empty() {
            return true;
        }
        if self.events.len() >= limits.max_events {
            return false;
        }
        if self.payload_bytes + event.payload_bytes() > limits.max_bytes {
            return false;
        }
        // first() is Some here, the batch is non-empty
        let span = self
            .events
            .first()
            .map_or(0, |first| event.timestamp_ms - first.timestamp_ms);
        span <= limits.max_span_ms
    }

    #[must_use]
    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    /// Sequence number of the first event, used for ordered-append
    /// bookkeeping and logging.
    #[must_use]
    pub fn first_seq(&self) -> Option<u64> {
        self.events.first().map(|e| e.seq)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn event(seq: u64, timestamp_ms: i64, message: &str) -> LogEvent {
        LogEvent {
            timestamp_ms,
            seq,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_payload_bytes_includes_overhead() {
        let e = event(0, 1_000, "hello");
        assert_eq!(e.payload_bytes(), 5 + constants::EVENT_OVERHEAD_BYTES);
    }

    #[test]
    fn test_pack_empty() {
        let batches = Batch::pack(Vec::new(), &BatchLimits::default());
        assert!(batches.is_empty());
    }

    #[test]
    fn test_pack_single_batch_preserves_order() {
        let events = vec![
            event(0, 1_000, "a"),
            event(1, 1_001, "b"),
            event(2, 1_002, "c"),
        ];
        let batches = Batch::pack(events, &BatchLimits::default());

        assert_eq!(batches.len(), 1);
        let seqs: Vec<u64> = batches[0].events().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn test_pack_respects_event_count() {
        let limits = BatchLimits {
            max_events: 2,
            ..BatchLimits::default()
        };
        let events = (0..5).map(|i| event(i, 1_000 + i as i64, "x")).collect();
        let batches = Batch::pack(events, &limits);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(batches[2].len(), 1);
        // Order is preserved across the split
        assert_eq!(batches[1].first_seq(), Some(2));
        assert_eq!(batches[2].first_seq(), Some(4));
    }

    #[test]
    fn test_pack_respects_byte_bound() {
        let per_event = 10 + constants::EVENT_OVERHEAD_BYTES;
        let limits = BatchLimits {
            max_bytes: per_event * 2,
            ..BatchLimits::default()
        };
        let events = (0..3)
            .map(|i| event(i, 1_000, &"y".repeat(10)))
            .collect();
        let batches = Batch::pack(events, &limits);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0].payload_bytes(), per_event * 2);
        assert_eq!(batches[1].len(), 1);
    }

    #[test]
    fn test_pack_oversized_event_gets_own_batch() {
        let limits = BatchLimits {
            max_bytes: 64,
            ..BatchLimits::default()
        };
        // Larger than max_bytes on its own: still shipped, alone.
        let events = vec![event(0, 1_000, &"z".repeat(100)), event(1, 1_001, "small")];
        let batches = Batch::pack(events, &limits);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[1].len(), 1);
    }

    #[test]
    fn test_pack_respects_time_span() {
        let limits = BatchLimits {
            max_span_ms: 1_000,
            ..BatchLimits::default()
        };
        let events = vec![
            event(0, 0, "a"),
            event(1, 500, "b"),
            event(2, 2_000, "c"),
        ];
        let batches = Batch::pack(events, &limits);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].first_seq(), Some(2));
    }

    #[test]
    fn test_pack_clamps_timestamp_regressions() {
        let events = vec![
            event(0, 5_000, "a"),
            event(1, 4_000, "b"),
            event(2, 6_000, "c"),
        ];
        let batches = Batch::pack(events, &BatchLimits::default());

        assert_eq!(batches.len(), 1);
        let timestamps: Vec<i64> = batches[0]
            .events()
            .iter()
            .map(|e| e.timestamp_ms)
            .collect();
        assert_eq!(timestamps, vec![5_000, 5_000, 6_000]);
    }
}
