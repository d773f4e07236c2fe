// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! CloudWatch Logs implementation of the wire contract.
//!
//! Every operation is a signed POST to `/` on the regional endpoint,
//! dispatched by the `X-Amz-Target` header and carrying
//! `application/x-amz-json-1.1` bodies. Service failures come back as
//! HTTP 400 with a `__type` discriminator, which is where the typed
//! [`ApiError`] variants come from.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::config::{Config, Credentials};
use crate::event::LogEvent;
use crate::sink::api::{ApiError, AppendAck, LogsApi};
use crate::sink::sign::RequestSigner;

const TARGET_PREFIX: &str = "Logs_20140328";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const SERVICE: &str = "logs";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CloudWatchLogsClient {
    client: reqwest::Client,
    endpoint: String,
    host: String,
    signer: RequestSigner,
}

impl CloudWatchLogsClient {
    #[must_use]
    pub fn new(region: &str, credentials: &Credentials, endpoint: Option<&str>) -> Self {
        let endpoint = endpoint
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://logs.{region}.amazonaws.com"))
            .trim_end_matches('/')
            .to_string();
        let host = endpoint
            .strip_prefix("https://")
            .or_else(|| endpoint.strip_prefix("http://"))
            .unwrap_or(&endpoint)
            .to_string();
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                error!("failed to build HTTP client: {e}, using defaults");
                reqwest::Client::new()
            });

        CloudWatchLogsClient {
            client,
            endpoint,
            host,
            signer: RequestSigner::new(credentials, region, SERVICE),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.region,
            &config.credentials,
            config.endpoint.as_deref(),
        )
    }

    async fn call<T: Serialize>(&self, action: &str, request: &T) -> Result<Vec<u8>, ApiError> {
        let target = format!("{TARGET_PREFIX}.{action}");
        let body = serde_json::to_vec(request).map_err(|e| ApiError::Service {
            kind: "SerializationError".to_string(),
            message: e.to_string(),
        })?;
        let signed = self.signer.sign(&self.host, &target, &body, Utc::now());

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", CONTENT_TYPE)
            .header("X-Amz-Target", &target)
            .header("X-Amz-Date", &signed.amz_date)
            .header("Authorization", &signed.authorization)
            .body(body)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if status.is_success() {
            return Ok(bytes.to_vec());
        }
        Err(decode_error(status, &bytes))
    }
}

fn decode_error(status: reqwest::StatusCode, body: &[u8]) -> ApiError {
    let parsed: WireError = serde_json::from_slice(body).unwrap_or_default();
    let kind = parsed
        .type_field
        .as_deref()
        .map(|t| t.rsplit('#').next().unwrap_or(t).to_string())
        .unwrap_or_default();
    let message = parsed
        .message
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

    match kind.as_str() {
        "ResourceAlreadyExistsException" => ApiError::ResourceAlreadyExists,
        "InvalidSequenceTokenException" => ApiError::InvalidSequenceToken {
            expected: parsed.expected_sequence_token,
        },
        "DataAlreadyAcceptedException" => ApiError::DataAlreadyAccepted {
            expected: parsed.expected_sequence_token,
        },
        "ThrottlingException" => ApiError::Throttling,
        "ServiceUnavailableException" => {
            ApiError::Transport(format!("service unavailable: {message}"))
        }
        "" if status.is_server_error() => ApiError::Transport(format!("HTTP {status}")),
        "" => ApiError::Service {
            kind: format!("HTTP {status}"),
            message,
        },
        _ if status.is_server_error() => ApiError::Transport(format!("{kind}: {message}")),
        _ => ApiError::Service { kind, message },
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogGroupRequest<'a> {
    log_group_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogStreamRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsRequest<'a> {
    log_group_name: &'a str,
    log_stream_name_prefix: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct DescribeLogStreamsResponse {
    log_streams: Vec<LogStreamSummary>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct LogStreamSummary {
    log_stream_name: String,
    upload_sequence_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InputLogEvent<'a> {
    timestamp: i64,
    message: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
    log_events: Vec<InputLogEvent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_token: Option<&'a str>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct PutLogEventsResponse {
    next_sequence_token: Option<String>,
    rejected_log_events_info: Option<RejectedLogEventsInfo>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RejectedLogEventsInfo {
    too_new_log_event_start_index: Option<usize>,
    too_old_log_event_end_index: Option<usize>,
    expired_log_event_end_index: Option<usize>,
}

#[derive(Deserialize, Default)]
struct WireError {
    #[serde(rename = "__type")]
    type_field: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
    #[serde(rename = "expectedSequenceToken")]
    expected_sequence_token: Option<String>,
}

#[async_trait]
impl LogsApi for CloudWatchLogsClient {
    async fn create_log_group(&self, group: &str) -> Result<(), ApiError> {
        self.call(
            "CreateLogGroup",
            &CreateLogGroupRequest {
                log_group_name: group,
            },
        )
        .await
        .map(|_| ())
    }

    async fn create_log_stream(&self, group: &str, stream: &str) -> Result<(), ApiError> {
        self.call(
            "CreateLogStream",
            &CreateLogStreamRequest {
                log_group_name: group,
                log_stream_name: stream,
            },
        )
        .await
        .map(|_| ())
    }

    async fn upload_sequence_token(
        &self,
        group: &str,
        stream: &str,
    ) -> Result<Option<String>, ApiError> {
        let bytes = self
            .call(
                "DescribeLogStreams",
                &DescribeLogStreamsRequest {
                    log_group_name: group,
                    log_stream_name_prefix: stream,
                },
            )
            .await?;
        let parsed: DescribeLogStreamsResponse =
            serde_json::from_slice(&bytes).map_err(|e| ApiError::Service {
                kind: "MalformedResponse".to_string(),
                message: e.to_string(),
            })?;
        Ok(parsed
            .log_streams
            .into_iter()
            .find(|s| s.log_stream_name == stream)
            .and_then(|s| s.upload_sequence_token))
    }

    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        sequence_token: Option<&str>,
        events: &[LogEvent],
    ) -> Result<AppendAck, ApiError> {
        let request = PutLogEventsRequest {
            log_group_name: group,
            log_stream_name: stream,
            log_events: events
                .iter()
                .map(|e| InputLogEvent {
                    timestamp: e.timestamp_ms,
                    message: &e.message,
                })
                .collect(),
            sequence_token,
        };
        let bytes = self.call("PutLogEvents", &request).await?;
        let parsed: PutLogEventsResponse = if bytes.is_empty() {
            PutLogEventsResponse::default()
        } else {
            serde_json::from_slice(&bytes).map_err(|e| ApiError::Service {
                kind: "MalformedResponse".to_string(),
                message: e.to_string(),
            })?
        };
        if let Some(rejected) = parsed.rejected_log_events_info {
            warn!(?rejected, "service rejected part of an accepted batch");
        }
        Ok(AppendAck {
            next_sequence_token: parsed.next_sequence_token,
        })
    }
}
