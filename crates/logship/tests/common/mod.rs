// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared test support: an in-memory log service with scriptable
//! failures.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use logship::event::LogEvent;
use logship::sink::{ApiError, AppendAck, LogsApi};

#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingState {
    pub groups: HashSet<String>,
    pub streams: HashSet<(String, String)>,
    pub current_token: Option<String>,
    pub token_counter: u64,
    /// Errors returned by upcoming appends, in order, before the service
    /// goes back to accepting.
    pub scripted_failures: VecDeque<ApiError>,
    pub accepted: Vec<String>,
    pub put_calls: u32,
}

/// In-memory stand-in for the remote log service.
#[derive(Clone, Default)]
pub struct RecordingApi {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingApi {
    pub fn with_failures(failures: Vec<ApiError>) -> Self {
        let api = RecordingApi::default();
        api.state().scripted_failures = failures.into();
        api
    }

    pub fn state(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap()
    }

    pub fn accepted(&self) -> Vec<String> {
        self.state().accepted.clone()
    }
}

#[async_trait]
impl LogsApi for RecordingApi {
    async fn create_log_group(&self, group: &str) -> Result<(), ApiError> {
        let mut state = self.state();
        if !state.groups.insert(group.to_string()) {
            return Err(ApiError::ResourceAlreadyExists);
        }
        Ok(())
    }

    async fn create_log_stream(&self, group: &str, stream: &str) -> Result<(), ApiError> {
        let mut state = self.state();
        if !state
            .streams
            .insert((group.to_string(), stream.to_string()))
        {
            return Err(ApiError::ResourceAlreadyExists);
        }
        Ok(())
    }

    async fn upload_sequence_token(
        &self,
        _group: &str,
        _stream: &str,
    ) -> Result<Option<String>, ApiError> {
        Ok(self.state().current_token.clone())
    }

    async fn put_log_events(
        &self,
        _group: &str,
        _stream: &str,
        sequence_token: Option<&str>,
        events: &[LogEvent],
    ) -> Result<AppendAck, ApiError> {
        let mut state = self.state();
        state.put_calls += 1;
        if let Some(failure) = state.scripted_failures.pop_front() {
            return Err(failure);
        }
        if sequence_token != state.current_token.as_deref() {
            return Err(ApiError::InvalidSequenceToken {
                expected: state.current_token.clone(),
            });
        }
        state
            .accepted
            .extend(events.iter().map(|e| e.message.clone()));
        state.token_counter += 1;
        let next = format!("tok-{}", state.token_counter);
        state.current_token = Some(next.clone());
        Ok(AppendAck {
            next_sequence_token: Some(next),
        })
    }
}
