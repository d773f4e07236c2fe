// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The single writer for one remote log stream.
//!
//! `StreamSinkClient` owns the stream identity and its sequence token.
//! Nothing else reads or writes the token; every mutation happens inside
//! `append` or `ensure_destination`, which keeps the single-writer
//! discipline the token-gated protocol assumes.
//!
//! Delivery is at-least-once: when an append genuinely landed but its
//! acknowledgment was lost, the retry surfaces as `DataAlreadyAccepted`
//! and is treated as success — the alternative (dropping on ambiguity)
//! would lose data.

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::event::Batch;
use crate::sink::api::{ApiError, LogsApi};
use crate::sink::backoff::{Backoff, RetryPolicy};

/// Terminal failure of an append or destination setup.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Retryable failures exhausted the attempt budget.
    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: ApiError,
    },

    /// The service rejected the call in a way retrying cannot fix.
    #[error("permanent sink failure: {0}")]
    Permanent(#[source] ApiError),
}

/// Identity of the remote destination plus the mutable token gating
/// appends to it. Lives for the whole run.
#[derive(Debug)]
pub struct StreamHandle {
    pub group_name: String,
    pub stream_name: String,
    next_sequence_token: Option<String>,
}

impl StreamHandle {
    #[must_use]
    pub fn new(group_name: impl Into<String>, stream_name: impl Into<String>) -> Self {
        StreamHandle {
            group_name: group_name.into(),
            stream_name: stream_name.into(),
            next_sequence_token: None,
        }
    }
}

pub struct StreamSinkClient<A> {
    api: A,
    handle: StreamHandle,
    retry: RetryPolicy,
}

impl<A: LogsApi> StreamSinkClient<A> {
    #[must_use]
    pub fn new(api: A, handle: StreamHandle, retry: RetryPolicy) -> Self {
        StreamSinkClient { api, handle, retry }
    }

    /// The token that will gate the next append. Observational only.
    #[must_use]
    pub fn sequence_token(&self) -> Option<&str> {
        self.handle.next_sequence_token.as_deref()
    }

    /// Creates the log group and stream if absent. Idempotent: "already
    /// exists" is success, and an existing stream's current token is
    /// recovered so the first append is gated correctly.
    pub async fn ensure_destination(&mut self) -> Result<(), SinkError> {
        let mut backoff = Backoff::new(self.retry.clone());
        loop {
            match self.try_ensure().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => match backoff.next_delay() {
                    Some(delay) => {
                        warn!("destination setup failed ({e}), retrying in {delay:?}");
                        sleep(delay).await;
                    }
                    None => {
                        return Err(SinkError::RetriesExhausted {
                            attempts: backoff.attempts(),
                            source: e,
                        })
                    }
                },
                Err(e) => return Err(SinkError::Permanent(e)),
            }
        }
    }

    async fn try_ensure(&mut self) -> Result<(), ApiError> {
        match self.api.create_log_group(&self.handle.group_name).await {
            Ok(()) => info!(group = %self.handle.group_name, "created log group"),
            Err(ApiError::ResourceAlreadyExists) => {
                debug!(group = %self.handle.group_name, "log group already exists");
            }
            Err(e) => return Err(e),
        }

        match self
            .api
            .create_log_stream(&self.handle.group_name, &self.handle.stream_name)
            .await
        {
            Ok(()) => {
                info!(stream = %self.handle.stream_name, "created log stream");
                self.handle.next_sequence_token = None;
            }
            Err(ApiError::ResourceAlreadyExists) => {
                debug!(stream = %self.handle.stream_name, "log stream already exists");
                // An existing stream may have been written to before;
                // start from its current token.
                self.handle.next_sequence_token = self
                    .api
                    .upload_sequence_token(&self.handle.group_name, &self.handle.stream_name)
                    .await?;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Appends one batch, retrying within the attempt budget. The batch
    /// is retried as the exact same unit, never reordered or merged.
    ///
    /// Returns the number of events delivered (the whole batch, or the
    /// error).
    pub async fn append(&mut self, batch: &Batch) -> Result<u64, SinkError> {
        let mut backoff = Backoff::new(self.retry.clone());
        let mut token_refreshed = false;

        loop {
            let result = self
                .api
                .put_log_events(
                    &self.handle.group_name,
                    &self.handle.stream_name,
                    self.handle.next_sequence_token.as_deref(),
                    batch.events(),
                )
                .await;

            match result {
                Ok(ack) => {
                    self.handle.next_sequence_token = ack.next_sequence_token;
                    debug!(
                        events = batch.len(),
                        first_seq = batch.first_seq(),
                        "batch accepted"
                    );
                    return Ok(batch.len() as u64);
                }
                Err(ApiError::InvalidSequenceToken { expected }) => {
                    // Refetch and retry the same batch once; a second
                    // mismatch means someone else is writing this stream.
                    if token_refreshed {
                        return Err(SinkError::Permanent(ApiError::InvalidSequenceToken {
                            expected,
                        }));
                    }
                    token_refreshed = true;
                    warn!("sequence token rejected, refreshing");
                    self.handle.next_sequence_token = match expected {
                        Some(token) => Some(token),
                        None => self.recover_token().await,
                    };
                }
                Err(ApiError::DataAlreadyAccepted { expected }) => {
                    // A previous attempt landed; counting it again would
                    // double-deliver.
                    debug!(
                        events = batch.len(),
                        "batch was already accepted by an earlier attempt"
                    );
                    self.handle.next_sequence_token = match expected {
                        Some(token) => Some(token),
                        None => self.recover_token().await,
                    };
                    return Ok(batch.len() as u64);
                }
                Err(e) if e.is_retryable() => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(
                            attempt = backoff.attempts(),
                            "append failed ({e}), retrying in {delay:?}"
                        );
                        sleep(delay).await;
                    }
                    None => {
                        return Err(SinkError::RetriesExhausted {
                            attempts: backoff.attempts(),
                            source: e,
                        })
                    }
                },
                Err(e) => return Err(SinkError::Permanent(e)),
            }
        }
    }

    /// Best-effort token recovery; a failure here simply surfaces as
    /// another token mismatch on the next append.
    async fn recover_token(&self) -> Option<String> {
        match self
            .api
            .upload_sequence_token(&self.handle.group_name, &self.handle.stream_name)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                warn!("failed to recover sequence token: {e}");
                None
            }
        }
    }
}
