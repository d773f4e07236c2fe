// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Container runner: starts the workload and exposes its output.
//!
//! The workload runs as `docker run --rm <image> /bin/sh -c <command>`.
//! Its stdout and stderr are forwarded line-wise by two reader tasks into
//! one bounded channel, so the two pipes interleave at line granularity
//! and a slow consumer backpressures the pipes (and through them, the
//! workload) instead of buffering without bound.

use std::io;
use std::process::Stdio;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Capacity of the pipe-to-capturer chunk channel. Small on purpose: the
/// event buffer is where intentional buffering lives.
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// A single forwarded line is capped at this size; longer source lines
/// arrive in slices. Keeps one pathological line from holding the
/// forwarder's memory hostage.
const MAX_LINE_BYTES: u64 = 256 * 1_024;

/// Merged workload output. Each chunk is one line from one of the two
/// pipes (trailing newline included), or a slice of an over-long line, or
/// a final unterminated fragment.
pub struct OutputStream {
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
}

impl OutputStream {
    /// Next chunk of output; `None` once both pipes reached end-of-stream.
    pub async fn next_chunk(&mut self) -> Option<io::Result<Vec<u8>>> {
        self.rx.recv().await
    }

    /// Builds a stream from pre-baked chunks. Test support.
    #[cfg(test)]
    pub(crate) fn from_chunks(chunks: Vec<io::Result<Vec<u8>>>) -> Self {
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });
        OutputStream { rx }
    }
}

/// How the workload ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadStatus {
    /// The workload's exit code; `128 + signal` when it died to a signal.
    pub exit_code: i32,
    /// True when the run was ended by the external stop signal rather
    /// than the workload exiting on its own.
    pub forced: bool,
}

impl WorkloadStatus {
    fn from_status(status: std::process::ExitStatus, forced: bool) -> Self {
        let exit_code = status.code().unwrap_or_else(|| {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                status.signal().map_or(-1, |sig| 128 + sig)
            }
            #[cfg(not(unix))]
            {
                -1
            }
        });
        WorkloadStatus { exit_code, forced }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.forced
    }
}

/// Handle on the running workload, independent of its output stream.
pub struct ContainerChild {
    child: Child,
    container_name: Option<String>,
}

impl ContainerChild {
    /// Waits for the workload to exit, or stops it when `cancel` fires.
    ///
    /// Safe to run concurrently with draining the output stream; the
    /// reader tasks observe end-of-stream on their own once the pipes
    /// close. Never hangs on a killed workload: death by signal maps to a
    /// synthetic `128 + signal` status.
    pub async fn wait_with_stop(
        mut self,
        cancel: &CancellationToken,
    ) -> io::Result<WorkloadStatus> {
        let finished = tokio::select! {
            status = self.child.wait() => Some(status?),
            () = cancel.cancelled() => None,
        };
        match finished {
            Some(status) => Ok(WorkloadStatus::from_status(status, false)),
            None => {
                debug!("stop signal received, terminating workload");
                self.stop().await;
                let status = self.child.wait().await?;
                Ok(WorkloadStatus::from_status(status, true))
            }
        }
    }

    async fn stop(&mut self) {
        // Kill the container by name first: killing only the CLI client
        // would leave the container running detached.
        if let Some(name) = &self.container_name {
            match Command::new("docker").args(["kill", name]).output().await {
                Ok(output) if !output.status.success() => {
                    debug!(container = %name, "docker kill exited nonzero");
                }
                Ok(_) => {}
                Err(e) => debug!(container = %name, "docker kill failed: {e}"),
            }
        }
        if let Err(e) = self.child.start_kill() {
            debug!("failed to signal workload process: {e}");
        }
    }
}

/// Builds and spawns the workload process.
pub struct ContainerRunner {
    command: Command,
    container_name: Option<String>,
}

impl ContainerRunner {
    /// The production constructor: run `command` through `/bin/sh -c`
    /// inside `image`. The container is named so it can be killed by name
    /// and is removed on exit (`--rm`).
    #[must_use]
    pub fn docker(image: &str, command: &str) -> Self {
        let name = format!("logship-{:08x}", rand::random::<u32>());
        let mut cmd = Command::new("docker");
        cmd.args(["run", "--rm", "--name", &name]);
        cmd.arg(image);
        cmd.args(["/bin/sh", "-c", command]);
        ContainerRunner {
            command: cmd,
            container_name: Some(name),
        }
    }

    /// Runs `command` directly on the host through `/bin/sh -c`, with the
    /// same streaming and termination plumbing. No isolation; exists so
    /// the pipeline can be exercised end-to-end without a container
    /// engine.
    #[must_use]
    pub fn host(command: &str) -> Self {
        let mut cmd = Command::new("/bin/sh");
        cmd.args(["-c", command]);
        ContainerRunner {
            command: cmd,
            container_name: None,
        }
    }

    /// Runs `program` directly with no shell wrapping. Test support for
    /// exercising spawn failures.
    #[cfg(test)]
    pub(crate) fn host_program(program: &str) -> Self {
        ContainerRunner {
            command: Command::new(program),
            container_name: None,
        }
    }

    /// Starts the workload. Failure to spawn is a launch error with no
    /// partial state; nothing has been captured or shipped yet.
    pub fn spawn(mut self) -> io::Result<(OutputStream, ContainerChild)> {
        self.command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = self.command.spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "workload stdout pipe missing")
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "workload stderr pipe missing")
        })?;

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        tokio::spawn(forward_lines(BufReader::new(stdout), tx.clone()));
        tokio::spawn(forward_lines(BufReader::new(stderr), tx));

        Ok((
            OutputStream { rx },
            ContainerChild {
                child,
                container_name: self.container_name,
            },
        ))
    }
}

/// Pumps one pipe into the chunk channel, one line at a time. Stops at
/// end-of-stream, after forwarding a read error, or when the receiver is
/// gone.
async fn forward_lines<R>(mut reader: R, tx: mpsc::Sender<io::Result<Vec<u8>>>)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut line = Vec::new();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES)
            .read_until(b'\n', &mut line)
            .await;
        match read {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(Ok(line)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
}
