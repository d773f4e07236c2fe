// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batcher: drains the event buffer into bound-respecting batches and
//! hands them to the sink client, one at a time, in order.
//!
//! The drain's `max_wait` doubles as the flush cadence, so low-volume
//! streams still ship promptly instead of waiting for a full batch. At
//! most one append is in flight per stream — the next drain happens only
//! after the previous append resolved — which the token-gated protocol
//! requires.
//!
//! A terminal sink failure stops shipping but not draining: remaining
//! events are counted as dropped so a blocked buffer can never stall the
//! workload after the sink is gone.

use std::time::Duration;

use tracing::{debug, error};

use crate::buffer::{DrainLimits, EventBuffer};
use crate::event::{Batch, BatchLimits};
use crate::sink::{LogsApi, SinkError, StreamSinkClient};

/// What one batcher run accomplished.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub events_sent: u64,
    pub events_dropped: u64,
    /// First terminal sink failure, if shipping broke down.
    pub terminal_error: Option<SinkError>,
}

pub struct Batcher<A> {
    buffer: EventBuffer,
    sink: StreamSinkClient<A>,
    limits: BatchLimits,
    flush_interval: Duration,
}

impl<A: LogsApi> Batcher<A> {
    #[must_use]
    pub fn new(
        buffer: EventBuffer,
        sink: StreamSinkClient<A>,
        limits: BatchLimits,
        flush_interval: Duration,
    ) -> Self {
        Batcher {
            buffer,
            sink,
            limits,
            flush_interval,
        }
    }

    /// Ships until the buffer is closed and empty, then returns the
    /// tally. The final drain after close keeps going until the buffer is
    /// exhausted, split into as many batches as the bounds require.
    pub async fn run(mut self) -> BatchSummary {
        let drain_limits = DrainLimits {
            max_events: self.limits.max_events,
            max_bytes: self.limits.max_bytes,
            max_wait: self.flush_interval,
        };
        let mut summary = BatchSummary::default();

        loop {
            let events = self.buffer.drain(&drain_limits).await;
            if events.is_empty() {
                if self.buffer.is_closed() && self.buffer.is_empty() {
                    break;
                }
                continue;
            }

            for batch in Batch::pack(events, &self.limits) {
                if summary.terminal_error.is_some() {
                    summary.events_dropped += batch.len() as u64;
                    continue;
                }
                match self.sink.append(&batch).await {
                    Ok(sent) => summary.events_sent += sent,
                    Err(e) => {
                        error!(
                            events = batch.len(),
                            "dropping batch, shipping failed terminally: {e}"
                        );
                        summary.events_dropped += batch.len() as u64;
                        summary.terminal_error = Some(e);
                    }
                }
            }
        }

        debug!(
            sent = summary.events_sent,
            dropped = summary.events_dropped,
            "batcher finished"
        );
        summary
    }
}
