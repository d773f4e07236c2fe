// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Run configuration.
//!
//! Everything the pipeline needs for one run: the workload (image +
//! command), the destination stream, credentials, and tuning knobs for
//! batching, buffering, retry, and drain. All required settings are
//! validated before any container is launched.

use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::constants;
use crate::event::BatchLimits;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid {
        name: &'static str,
        reason: String,
    },
}

/// Static credential pair for signing sink requests.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Credentials {
    /// Resolves credentials from explicit values, falling back to the
    /// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` environment variables.
    pub fn resolve(
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        let access_key_id = access_key_id
            .or_else(|| env::var("AWS_ACCESS_KEY_ID").ok())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("access key id"))?;
        let secret_access_key = secret_access_key
            .or_else(|| env::var("AWS_SECRET_ACCESS_KEY").ok())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("secret access key"))?;
        Ok(Credentials {
            access_key_id,
            secret_access_key,
        })
    }
}

impl fmt::Debug for Credentials {
    // The secret never reaches logs, panics, or error chains.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Configuration for one shipping run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Container image to run the workload in.
    pub image: String,
    /// Shell command executed inside the container via `/bin/sh -c`.
    pub command: String,
    /// Destination log group, created if absent.
    pub log_group: String,
    /// Destination log stream, created if absent.
    pub log_stream: String,
    /// Region of the log service endpoint.
    pub region: String,
    pub credentials: Credentials,
    /// Endpoint override, mainly for tests; defaults to the regional
    /// endpoint.
    pub endpoint: Option<String>,

    /// Event buffer capacity between capturer and batcher.
    pub buffer_capacity: usize,
    /// When true, a full buffer evicts the oldest event instead of
    /// blocking the capturer.
    pub lossy: bool,
    pub batch: BatchLimits,
    /// Cadence on which partial batches ship under light traffic.
    pub flush_interval: Duration,
    /// Budget for flushing buffered events after the workload exits.
    pub drain_timeout: Duration,
    /// Append attempt budget for retryable sink failures.
    pub max_attempts: u32,
}

impl Config {
    /// Builds a config with default tuning for the given workload and
    /// destination.
    #[must_use]
    pub fn new(
        image: impl Into<String>,
        command: impl Into<String>,
        log_group: impl Into<String>,
        log_stream: impl Into<String>,
        region: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Config {
            image: image.into(),
            command: command.into(),
            log_group: log_group.into(),
            log_stream: log_stream.into(),
            region: region.into(),
            credentials,
            endpoint: None,
            buffer_capacity: constants::DEFAULT_BUFFER_CAPACITY,
            lossy: false,
            batch: BatchLimits::default(),
            flush_interval: Duration::from_millis(constants::DEFAULT_FLUSH_INTERVAL_MS),
            drain_timeout: Duration::from_secs(constants::DEFAULT_DRAIN_TIMEOUT_SECS),
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Checks required settings, reported before any container is
    /// launched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn required(name: &'static str, value: &str) -> Result<(), ConfigError> {
            if value.is_empty() {
                return Err(ConfigError::Missing(name));
            }
            Ok(())
        }

        required("image", &self.image)?;
        required("command", &self.command)?;
        required("log group", &self.log_group)?;
        required("log stream", &self.log_stream)?;
        required("region", &self.region)?;
        required("access key id", &self.credentials.access_key_id)?;
        required("secret access key", &self.credentials.secret_access_key)?;

        if self.buffer_capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "buffer capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "max attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
