// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The abstract wire contract of the remote log service.
//!
//! Four operations: create the group, create the stream (both idempotent
//! in the sense that "already exists" is reported distinctly and treated
//! as success by the caller), recover the current sequence token, and the
//! token-gated append itself.

use async_trait::async_trait;
use thiserror::Error;

use crate::event::LogEvent;

/// Typed failure of a single wire call. `is_retryable` is the split the
/// client's retry loop keys on; everything else is either handled
/// structurally (token errors, already-exists) or permanent.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The group or stream being created already exists. Callers treat
    /// this as success.
    #[error("destination already exists")]
    ResourceAlreadyExists,

    /// The presented sequence token was stale. `expected` carries the
    /// token the service reported wanting, when it did.
    #[error("sequence token rejected")]
    InvalidSequenceToken { expected: Option<String> },

    /// This exact batch was already accepted by an earlier attempt whose
    /// acknowledgment was lost.
    #[error("batch was already accepted")]
    DataAlreadyAccepted { expected: Option<String> },

    #[error("throttled by the service")]
    Throttling,

    /// Network-level failure: connect, timeout, or a 5xx with no usable
    /// error body.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Anything else the service rejects: malformed payload, auth
    /// failure, missing destination. Not retryable.
    #[error("{kind}: {message}")]
    Service { kind: String, message: String },
}

impl ApiError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Throttling | ApiError::Transport(_))
    }
}

/// Acknowledgment of an accepted append.
#[derive(Debug, Clone, Default)]
pub struct AppendAck {
    /// Token to present on the next append to the same stream.
    pub next_sequence_token: Option<String>,
}

#[async_trait]
pub trait LogsApi: Send + Sync {
    async fn create_log_group(&self, group: &str) -> Result<(), ApiError>;

    async fn create_log_stream(&self, group: &str, stream: &str) -> Result<(), ApiError>;

    /// The stream's current upload sequence token, `None` for a stream
    /// that has never been written to.
    async fn upload_sequence_token(
        &self,
        group: &str,
        stream: &str,
    ) -> Result<Option<String>, ApiError>;

    /// Appends `events` (non-decreasing timestamps, caller-enforced)
    /// gated on `sequence_token`.
    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        sequence_token: Option<&str>,
        events: &[LogEvent],
    ) -> Result<AppendAck, ApiError>;
}
