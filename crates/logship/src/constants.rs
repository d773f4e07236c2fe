// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Limits imposed by the remote log-stream append API.
//!
//! A single append call is bounded three ways: total payload size, event
//! count, and the wall-clock span the batch may cover. The batcher splits
//! on whichever bound is hit first; payloads that violate any of them are
//! rejected by the service.

/// Maximum serialized batch size in bytes for one append call.
///
/// Size is accounted as the UTF-8 length of every message plus
/// [`EVENT_OVERHEAD_BYTES`] per event.
pub const MAX_BATCH_BYTES: usize = 1_048_576;

/// Fixed per-event accounting overhead the service charges on top of the
/// message body.
pub const EVENT_OVERHEAD_BYTES: usize = 26;

/// Maximum number of events in one append call.
pub const MAX_BATCH_EVENTS: usize = 10_000;

/// Maximum wall-clock span one batch may cover, in milliseconds (24 hours).
pub const MAX_BATCH_SPAN_MS: i64 = 24 * 60 * 60 * 1_000;

/// Maximum size of a single event's message in bytes.
///
/// Longer messages are truncated at capture time; the service rejects the
/// whole batch otherwise.
pub const MAX_EVENT_BYTES: usize = 256 * 1_024 - EVENT_OVERHEAD_BYTES;

/// Default append attempt budget for retryable failures.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default cadence on which the batcher drains the event buffer.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 200;

/// Default capacity of the event buffer between capturer and batcher.
pub const DEFAULT_BUFFER_CAPACITY: usize = 4_096;

/// Default time budget for draining buffered events after the workload
/// exits.
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;
