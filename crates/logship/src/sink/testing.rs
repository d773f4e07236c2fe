// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory [`LogsApi`] fake with scriptable failures, shared by the
//! pipeline unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::event::LogEvent;
use crate::sink::api::{ApiError, AppendAck, LogsApi};

#[derive(Default)]
pub(crate) struct FakeState {
    pub groups: HashSet<String>,
    pub streams: HashSet<(String, String)>,
    pub current_token: Option<String>,
    pub token_counter: u64,
    /// Errors returned by upcoming `put_log_events` calls, in order,
    /// before the fake goes back to accepting.
    pub scripted_failures: VecDeque<ApiError>,
    /// Messages accepted so far, in arrival order.
    pub accepted: Vec<String>,
    pub put_calls: u32,
}

#[derive(Clone, Default)]
pub(crate) struct FakeApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeApi {
    pub fn with_failures(failures: Vec<ApiError>) -> Self {
        let fake = FakeApi::default();
        fake.state().scripted_failures = failures.into();
        fake
    }

    #[allow(clippy::unwrap_used)]
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn accepted(&self) -> Vec<String> {
        self.state().accepted.clone()
    }

    pub fn put_calls(&self) -> u32 {
        self.state().put_calls
    }
}

#[async_trait]
impl LogsApi for FakeApi {
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
