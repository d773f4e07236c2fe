// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # logship
//!
//! Runs a command inside an ephemeral container, captures its combined
//! output while it runs, and forwards that output as ordered, batched
//! log events to a sequence-token-gated remote log stream.
//!
//! ## Pipeline
//!
//! ```text
//!   workload (container)
//!        │  stdout/stderr
//!        v
//!   ┌─────────────┐
//!   │   Runner    │  line-wise merge of both pipes
//!   └──────┬──────┘
//!          v
//!   ┌─────────────┐
//!   │  Capturer   │  newline split, timestamp, sequence
//!   └──────┬──────┘
//!          v
//!   ┌─────────────┐
//!   │Event Buffer │  bounded, backpressure to the workload
//!   └──────┬──────┘
//!          v
//!   ┌─────────────┐
//!   │   Batcher   │  size/count/span bounds, one in flight
//!   └──────┬──────┘
//!          v
//!   ┌─────────────┐
//!   │ Sink Client │  token-gated append, retry with backoff
//!   └──────┬──────┘
//!          v
//!     remote log stream
//! ```
//!
//! The [`orchestrator::Orchestrator`] wires these together and owns the
//! run lifecycle; [`config::Config`] carries everything a run needs.
//! Delivery is at-least-once: retries after a lost acknowledgment can
//! duplicate, never reorder or lose silently — every dropped event is
//! counted and surfaced in the final [`orchestrator::RunResult`].

#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]

pub mod batcher;
pub mod buffer;
pub mod capture;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod orchestrator;
pub mod runner;
pub mod sink;

pub use config::{Config, Credentials};
pub use error::{ErrorKind, ShipperError};
pub use orchestrator::{Orchestrator, RunResult, SHIPPING_FAILURE_EXIT_CODE};
