// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Orchestrator: wires the pipeline together and owns the run lifecycle.
//!
//! A run moves through four phases: starting (destination setup and
//! workload launch — failures here abort with no partial state),
//! streaming (capture and shipping run concurrently with the workload),
//! draining (workload exited; remaining buffered events are flushed,
//! bounded by the drain timeout), done (the final tally).
//!
//! Shipping failure never kills the workload: the batcher keeps draining
//! — counting instead of sending — so the run always reaches its own
//! exit, whose code the result mirrors. A terminal shipping failure
//! surfaces as a distinct exit code only when the workload itself
//! succeeded.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::batcher::{BatchSummary, Batcher};
use crate::buffer::{EventBuffer, OverflowPolicy};
use crate::capture::LogCapturer;
use crate::config::Config;
use crate::error::{ErrorKind, ShipperError};
use crate::runner::{ContainerRunner, WorkloadStatus};
use crate::sink::{LogsApi, RetryPolicy, StreamHandle, StreamSinkClient};

/// Exit code reported when the workload succeeded but its output could
/// not be shipped.
pub const SHIPPING_FAILURE_EXIT_CODE: i32 = 70;

/// Grace period for the batcher to notice a discarded buffer once the
/// drain timeout has expired.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// The final tally of one run. Produced exactly once.
#[derive(Debug)]
pub struct RunResult {
    /// The workload's exit code, [`SHIPPING_FAILURE_EXIT_CODE`] if the
    /// workload succeeded but shipping failed terminally.
    pub exit_code: i32,
    pub events_sent: u64,
    pub events_dropped: u64,
    pub terminal_error: Option<ErrorKind>,
}

pub struct Orchestrator<A> {
    config: Config,
    api: A,
}

impl<A: LogsApi + 'static> Orchestrator<A> {
    #[must_use]
    pub fn new(config: Config, api: A) -> Self {
        Orchestrator { config, api }
    }

    /// Runs the workload to completion while shipping its output.
    ///
    /// `runner` is the prepared (not yet spawned) workload; `cancel` is
    /// the external stop signal — on cancellation the workload is
    /// terminated, capture observes end-of-stream, and one bounded drain
    /// still runs.
    ///
    /// Errors are starting-phase only (bad config, unreachable
    /// destination, failed launch); once streaming begins the run always
    /// produces a [`RunResult`].
    pub async fn run(
        self,
        runner: ContainerRunner,
        cancel: CancellationToken,
    ) -> Result<RunResult, ShipperError> {
        self.config.validate()?;

        info!(
            group = %self.config.log_group,
            stream = %self.config.log_stream,
            "starting: preparing destination"
        );
        let retry = RetryPolicy {
            max_attempts: self.config.max_attempts,
            ..RetryPolicy::default()
        };
        let mut sink = StreamSinkClient::new(
            self.api,
            StreamHandle::new(&self.config.log_group, &self.config.log_stream),
            retry,
        );
        sink.ensure_destination().await?;

        let (output, child) = runner.spawn().map_err(ShipperError::Launch)?;
        info!(image = %self.config.image, "starting: workload launched");

        let policy = if self.config.lossy {
            OverflowPolicy::DropOldest
        } else {
            OverflowPolicy::Block
        };
        let buffer = EventBuffer::new(self.config.buffer_capacity, policy);

        let mut capture_task = tokio::spawn(LogCapturer::new(buffer.clone()).run(output));
        let mut batcher_task = tokio::spawn(
            Batcher::new(
                buffer.clone(),
                sink,
                self.config.batch,
                self.config.flush_interval,
            )
            .run(),
        );

        info!("streaming: capturing workload output");
        let status = match child.wait_with_stop(&cancel).await {
            Ok(status) => status,
            Err(e) => {
                error!("failed waiting for workload: {e}");
                WorkloadStatus {
                    exit_code: -1,
                    forced: false,
                }
            }
        };

        info!(
            exit_code = status.exit_code,
            forced = status.forced,
            "draining: workload finished, flushing remaining events"
        );

        let deadline = tokio::time::Instant::now() + self.config.drain_timeout;
        let mut terminal_error = None;

        let capture_result = match tokio::time::timeout_at(deadline, &mut capture_task).await {
            Ok(result) => result,
            Err(_) => {
                // The workload exited but something still holds its
                // pipes open (a lingering grandchild); cut capture loose.
                warn!("output stream did not close within the drain timeout");
                capture_task.abort();
                capture_task.await
            }
        };
        // Normally capture closes the buffer itself; an aborted capture
        // does not get the chance.
        buffer.close();

        match capture_result {
            Ok(Ok(captured)) => info!(captured, "capture finished"),
            Ok(Err(e)) => {
                error!("capture failed, output after the failure is lost: {e}");
                terminal_error = Some(e.kind());
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                error!("capture task failed: {e}");
                terminal_error = Some(ErrorKind::StreamRead);
            }
        }

        let batcher_result = match tokio::time::timeout_at(deadline, &mut batcher_task).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout = ?self.config.drain_timeout,
                    "drain timeout exceeded, dropping remaining events"
                );
                buffer.discard_remaining();
                match tokio::time::timeout(DRAIN_GRACE, &mut batcher_task).await {
                    Ok(result) => result,
                    Err(_) => {
                        error!("batcher did not settle after drain timeout");
                        batcher_task.abort();
                        return Ok(finish(
                            status,
                            BatchSummary::default(),
                            buffer.dropped(),
                            Some(ErrorKind::Shipping),
                        ));
                    }
                }
            }
        };

        let summary = match batcher_result {
            Ok(summary) => summary,
            Err(e) => {
                error!("batcher task failed: {e}");
                terminal_error = Some(ErrorKind::Shipping);
                BatchSummary::default()
            }
        };
        if let Some(e) = &summary.terminal_error {
            error!("shipping failed terminally: {e}");
            terminal_error = Some(ErrorKind::Shipping);
        }

        Ok(finish(status, summary, buffer.dropped(), terminal_error))
    }
}

fn finish(
    status: WorkloadStatus,
    summary: BatchSummary,
    buffer_dropped: u64,
    terminal_error: Option<ErrorKind>,
) -> RunResult {
    let mut exit_code = status.exit_code;
    if exit_code == 0 && terminal_error == Some(ErrorKind::Shipping) {
        exit_code = SHIPPING_FAILURE_EXIT_CODE;
    }

    let result = RunResult {
        exit_code,
        events_sent: summary.events_sent,
        events_dropped: summary.events_dropped + buffer_dropped,
        terminal_error,
    };
    info!(
        exit_code = result.exit_code,
        events_sent = result.events_sent,
        events_dropped = result.events_dropped,
        "done"
    );
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::sink::api::ApiError;
    use crate::sink::testing::FakeApi;

    fn test_config() -> Config {
        let mut config = Config::new(
            "unused-image",
            "unused-command",
            "group",
            "stream",
            "us-west-2",
            Credentials {
                access_key_id: "k".to_string(),
                secret_access_key: "s".to_string(),
            },
        );
        config.flush_interval = Duration::from_millis(10);
        config.drain_timeout = Duration::from_secs(5);
        config
    }

    async fn run_host(
        config: Config,
        api: FakeApi,
        command: &str,
        cancel: CancellationToken,
    ) -> Result<RunResult, ShipperError> {
        Orchestrator::new(config, api)
            .run(ContainerRunner::host(command), cancel)
            .await
    }

    #[tokio::test]
    async fn test_three_lines_ship_in_order() {
        let api = FakeApi::default();
        let result = run_host(
            test_config(),
            api.clone(),
            "echo a; echo b; echo c",
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.events_sent, 3);
        assert_eq!(result.events_dropped, 0);
        assert!(result.terminal_error.is_none());
        assert_eq!(api.accepted(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_workload_exit_code_propagates() {
        let api = FakeApi::default();
        let result = run_host(
            test_config(),
            api,
            "echo oops; exit 3",
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.exit_code, 3);
        assert_eq!(result.events_sent, 1);
    }

    #[tokio::test]
    async fn test_shipping_failure_overrides_successful_exit() {
        let api = FakeApi::with_failures(vec![ApiError::Service {
            kind: "AccessDeniedException".to_string(),
            message: "no".to_string(),
        }]);
        let result = run_host(test_config(), api, "echo a", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.exit_code, SHIPPING_FAILURE_EXIT_CODE);
        assert_eq!(result.events_sent, 0);
        assert_eq!(result.events_dropped, 1);
        assert_eq!(result.terminal_error, Some(ErrorKind::Shipping));
    }

    #[tokio::test]
    async fn test_workload_failure_takes_precedence_over_shipping_code() {
        let api = FakeApi::with_failures(vec![ApiError::Service {
            kind: "AccessDeniedException".to_string(),
            message: "no".to_string(),
        }]);
        let result = run_host(
            test_config(),
            api,
            "echo a; exit 9",
            CancellationToken::new(),
        )
        .await
        .unwrap();

        // The workload's own failure code wins; shipping failure is still
        // visible in the error kind and the dropped count.
        assert_eq!(result.exit_code, 9);
        assert_eq!(result.terminal_error, Some(ErrorKind::Shipping));
    }

    #[tokio::test]
    async fn test_stop_signal_ships_captured_line() {
        let api = FakeApi::default();
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let result = run_host(
            test_config(),
            api.clone(),
            "echo one; exec sleep 600",
            cancel,
        )
        .await
        .unwrap();

        assert_ne!(result.exit_code, 0);
        assert_eq!(result.events_sent, 1);
        assert_eq!(api.accepted(), vec!["one"]);
    }

    #[tokio::test]
    async fn test_small_buffer_loses_nothing_under_blocking_policy() {
        let api = FakeApi::default();
        let mut config = test_config();
        config.buffer_capacity = 2;

        let result = run_host(
            config,
            api.clone(),
            "for i in 1 2 3 4 5; do echo line$i; done",
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.events_sent, 5);
        assert_eq!(result.events_dropped, 0);
        assert_eq!(
            api.accepted(),
            vec!["line1", "line2", "line3", "line4", "line5"]
        );
    }

    #[tokio::test]
    async fn test_launch_failure_is_immediate() {
        let api = FakeApi::default();
        let err = Orchestrator::new(test_config(), api.clone())
            .run(
                ContainerRunner::host_program("/nonexistent/binary"),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ShipperError::Launch(_)));
        // Destination setup had already happened; launch failure leaves
        // no pipeline behind.
        assert_eq!(api.put_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_anything_runs() {
        let api = FakeApi::default();
        let mut config = test_config();
        config.log_group = String::new();

        let err = run_host(config, api.clone(), "echo a", CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ShipperError::Config(_)));
        assert!(api.state().groups.is_empty());
    }

    #[tokio::test]
    async fn test_drain_timeout_bounds_stuck_pipes() {
        // The workload exits but leaves a grandchild holding the output
        // pipe, so capture never sees end-of-stream on its own.
        let api = FakeApi::default();
        let mut config = test_config();
        config.drain_timeout = Duration::from_millis(300);

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            run_host(
                config,
                api.clone(),
                "echo held; sleep 30 & exit 0",
                CancellationToken::new(),
            ),
        )
        .await
        .expect("drain timeout must bound the run")
        .unwrap();

        assert_eq!(result.exit_code, 0);
        // The line emitted before the exit still shipped.
        assert_eq!(api.accepted(), vec!["held"]);
        assert_eq!(result.events_sent, 1);
    }
}
