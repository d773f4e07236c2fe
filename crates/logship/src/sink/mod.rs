// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stream sink client: ordered, token-gated appends to the remote log
//! service.
//!
//! Split the way transport and policy are kept apart elsewhere in this
//! codebase:
//!
//! - [`api`] — the abstract wire contract ([`api::LogsApi`]) and its
//!   typed errors
//! - [`http`] — the production implementation over the CloudWatch Logs
//!   JSON protocol
//! - `sign` — request signing
//! - [`backoff`] — retry state with exponential backoff and jitter
//! - [`client`] — [`client::StreamSinkClient`], the single writer that
//!   owns the stream identity and its sequence token

pub mod api;
pub mod backoff;
pub mod client;
pub mod http;
mod sign;
#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiError, AppendAck, LogsApi};
pub use backoff::RetryPolicy;
pub use client::{SinkError, StreamHandle, StreamSinkClient};
