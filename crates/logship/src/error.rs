// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Crate-level error taxonomy.
//!
//! Recoverable conditions (sequence-token mismatch, throttling, transient
//! network failure) are retried inside the sink client and never surface
//! here. What does surface is terminal: the workload could not start, its
//! output stream broke, or shipping exhausted its retry budget.

use thiserror::Error;

use crate::config::ConfigError;
use crate::sink::SinkError;

/// Terminal failure of a run component.
#[derive(Debug, Error)]
pub enum ShipperError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The container/process could not start. Fatal, no retry, no partial
    /// state.
    #[error("failed to launch workload: {0}")]
    Launch(#[source] std::io::Error),

    /// Unexpected I/O failure reading workload output. Fatal to capture;
    /// the workload keeps running but output after this point is lost.
    #[error("failed reading workload output: {0}")]
    StreamRead(#[source] std::io::Error),

    /// Shipping exhausted its retry budget or hit a permanent sink error.
    #[error("shipping failed: {0}")]
    Shipping(#[from] SinkError),
}

/// Coarse classification carried in the final [`RunResult`]
/// (`crate::orchestrator::RunResult`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Launch,
    StreamRead,
    Shipping,
}

impl ShipperError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShipperError::Config(_) | ShipperError::Launch(_) => ErrorKind::Launch,
            ShipperError::StreamRead(_) => ErrorKind::StreamRead,
            ShipperError::Shipping(_) => ErrorKind::Shipping,
        }
    }
}
