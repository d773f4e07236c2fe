// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use logship::runner::ContainerRunner;
use logship::sink::http::CloudWatchLogsClient;
use logship::{Config, Credentials, Orchestrator, ShipperError};

/// Run a command inside a container and ship its output to a remote log
/// stream while it runs.
#[derive(Parser)]
#[command(name = "logship", version)]
struct Cli {
    /// Container image to run the command in
    #[arg(long)]
    image: String,

    /// Shell command executed inside the container via /bin/sh -c
    #[arg(long)]
    command: String,

    /// Destination log group, created if absent
    #[arg(long)]
    log_group: String,

    /// Destination log stream, created if absent
    #[arg(long)]
    log_stream: String,

    /// Region of the log service
    #[arg(long)]
    region: String,

    /// Access key id; falls back to AWS_ACCESS_KEY_ID
    #[arg(long)]
    access_key_id: Option<String>,

    /// Secret access key; falls back to AWS_SECRET_ACCESS_KEY
    #[arg(long)]
    secret_access_key: Option<String>,

    /// Log service endpoint override
    #[arg(long)]
    endpoint_url: Option<String>,

    /// Drop the oldest buffered event instead of blocking the workload
    /// when the buffer is full
    #[arg(long)]
    lossy: bool,

    /// Seconds allowed for flushing buffered events after the workload
    /// exits
    #[arg(long, default_value_t = 30)]
    drain_timeout_secs: u64,
}

#[tokio::main]
pub async fn main() {
    let cli = Cli::parse();

    let log_level = env::var("LOGSHIP_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let credentials = match Credentials::resolve(cli.access_key_id, cli.secret_access_key) {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("configuration error: {e}");
            std::process::exit(2);
        }
    };

    let mut config = Config::new(
        cli.image,
        cli.command,
        cli.log_group,
        cli.log_stream,
        cli.region,
        credentials,
    );
    config.endpoint = cli.endpoint_url;
    config.lossy = cli.lossy;
    config.drain_timeout = Duration::from_secs(cli.drain_timeout_secs);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop signal received, terminating workload");
            signal_cancel.cancel();
        }
    });

    let runner = ContainerRunner::docker(&config.image, &config.command);
    let api = CloudWatchLogsClient::from_config(&config);

    match Orchestrator::new(config, api).run(runner, cancel).await {
        Ok(result) => {
            info!(
                events_sent = result.events_sent,
                events_dropped = result.events_dropped,
                exit_code = result.exit_code,
                "run complete"
            );
            std::process::exit(result.exit_code);
        }
        Err(e) => {
            error!("run failed before streaming started: {e}");
            let code = match e {
                ShipperError::Config(_) => 2,
                _ => 1,
            };
            std::process::exit(code);
        }
    }
}
