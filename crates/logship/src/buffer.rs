// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded event buffer between the capturer and the batcher.
//!
//! This is the only shared-mutable boundary in the pipeline. The producer
//! side (`push`) suspends while the buffer is full under the default
//! blocking policy, which propagates backpressure through the output
//! stream to the workload's own pipe. The lossy policy instead evicts the
//! oldest event and counts it, FIFO eviction keeping the process
//! operational under sustained overload at the cost of the oldest data.
//!
//! The consumer side (`drain`) is the batcher's cadence suspension point:
//! it returns as soon as events are available (up to the count/byte
//! bounds) and returns empty only after `max_wait` elapses with nothing
//! buffered, or once the buffer is closed and exhausted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tracing::warn;

use crate::event::LogEvent;

/// What `push` does when the buffer is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Suspend the producer until the batcher frees space. Slow shipping
    /// never causes silent loss; it can stall the workload's output pipe.
    Block,
    /// Evict the oldest buffered event and count it as dropped. Explicit
    /// lossy mode only.
    DropOldest,
}

/// Bounds for one `drain` call; whichever is hit first applies.
#[derive(Debug, Clone, Copy)]
pub struct DrainLimits {
    pub max_events: usize,
    pub max_bytes: usize,
    pub max_wait: Duration,
}

#[derive(Default)]
struct State {
    queue: VecDeque<LogEvent>,
    dropped: u64,
    closed: bool,
}

struct Inner {
    capacity: usize,
    policy: OverflowPolicy,
    state: Mutex<State>,
    not_empty: Notify,
    not_full: Notify,
}

/// Bounded FIFO of pending events. Cheap to clone; all clones share the
/// same queue. One producer (the capturer) and one consumer (the batcher).
#[derive(Clone)]
pub struct EventBuffer {
    inner: Arc<Inner>,
}

impl EventBuffer {
    #[must_use]
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        EventBuffer {
            inner: Arc::new(Inner {
                capacity,
                policy,
                state: Mutex::new(State::default()),
                not_empty: Notify::new(),
                not_full: Notify::new(),
            }),
        }
    }

    #[allow(clippy::expect_used)]
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().expect("event buffer lock poisoned")
    }

    /// Adds an event, suspending while full under [`OverflowPolicy::Block`].
    pub async fn push(&self, event: LogEvent) {
        let mut pending = Some(event);
        loop {
            let notified = self.inner.not_full.notified();
            {
                let mut state = self.lock_state();
                if let Some(event) = pending.take() {
                    if state.queue.len() < self.inner.capacity {
                        state.queue.push_back(event);
                    } else {
                        match self.inner.policy {
                            OverflowPolicy::DropOldest => {
                                state.queue.pop_front();
                                state.dropped += 1;
                                warn!(
                                    capacity = self.inner.capacity,
                                    "event buffer full, dropping oldest event"
                                );
                                state.queue.push_back(event);
                            }
                            OverflowPolicy::Block => pending = Some(event),
                        }
                    }
                }
                if pending.is_none() {
                    drop(state);
                    self.inner.not_empty.notify_one();
                    return;
                }
            }
            notified.await;
        }
    }

    /// Removes up to `max_events` / `max_bytes` worth of events, in order.
    ///
    /// Returns empty only after `max_wait` elapses with nothing buffered,
    /// or immediately once the buffer is closed and exhausted. At least
    /// one event is always returned when any is available, even if it
    /// exceeds `max_bytes` on its own.
    pub async fn drain(&self, limits: &DrainLimits) -> Vec<LogEvent> {
        let deadline = Instant::now() + limits.max_wait;
        loop {
            let notified = self.inner.not_empty.notified();
            {
                let mut state = self.lock_state();
                if !state.queue.is_empty() {
                    let mut events = Vec::new();
                    let mut bytes = 0usize;
                    while events.len() < limits.max_events {
                        let fits = state.queue.front().is_some_and(|front| {
                            events.is_empty() || bytes + front.payload_bytes() <= limits.max_bytes
                        });
                        if !fits {
                            break;
                        }
                        if let Some(event) = state.queue.pop_front() {
                            bytes += event.payload_bytes();
                            events.push(event);
                        }
                    }
                    drop(state);
                    self.inner.not_full.notify_waiters();
                    return events;
                }
                if state.closed {
                    return Vec::new();
                }
            }
            if time::timeout_at(deadline, notified).await.is_err() {
                return Vec::new();
            }
        }
    }

    /// Marks end-of-input. `drain` callers then distinguish "nothing yet"
    /// from "finished".
    pub fn close(&self) {
        self.lock_state().closed = true;
        self.inner.not_empty.notify_waiters();
    }

    /// Discards everything still buffered, counting it as dropped.
    /// Used when the drain timeout expires.
    pub fn discard_remaining(&self) -> u64 {
        let mut state = self.lock_state();
        let discarded = state.queue.len() as u64;
        state.queue.clear();
        state.dropped += discarded;
        drop(state);
        self.inner.not_full.notify_waiters();
        discarded
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_state().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_state().queue.is_empty()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    /// Events lost to eviction or discarding so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.lock_state().dropped
    }
}
