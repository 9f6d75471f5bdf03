// Homewatch - Home monitoring telemetry pipeline
//
// Copyright 2026 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use clap::Parser;
use homewatch::config::{InfluxArgs, NotifyArgs, RestartArgs, TimeoutArgs};
use homewatch::influx::InfluxClient;
use homewatch::jobs::{DownsampleJob, Job, JobContext, JobRunner, StateStore, DEFAULT_POLL_INTERVAL};
use homewatch::notify::AppriseNotifier;
use homewatch::supervisor::Supervisor;
use std::{io, process};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_STATE_FILE: &str = "data/states.json";

/// Run periodic maintenance jobs against InfluxDB
///
/// Each job runs once at startup and then again every time its interval has
/// elapsed. Whatever state a job returns is saved to a JSON file (with a copy of
/// the previous version next to it) and handed back to the job on its next run,
/// including after this process restarts.
#[derive(Debug, Parser)]
#[clap(name = "homewatch-jobs", version = clap::crate_version ! ())]
struct JobsApplication {
    #[command(flatten)]
    influx: InfluxArgs,

    #[command(flatten)]
    notify: NotifyArgs,

    #[command(flatten)]
    restart: RestartArgs,

    #[command(flatten)]
    timeout: TimeoutArgs,

    /// Path to the JSON file job state is kept in. The directory is created if it
    /// doesn't exist
    #[arg(long, default_value = DEFAULT_STATE_FILE)]
    state_file: PathBuf,

    /// How often to check if any jobs are due, in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    poll_interval_ms: u64,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[arg(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = JobsApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let timeout = opts.timeout.timeout();
    let db = InfluxClient::new(opts.influx.into_config(timeout)).unwrap_or_else(|e| {
        tracing::error!(message = "failed to create database client", error = %e);
        process::exit(1)
    });
    let notifier = AppriseNotifier::new(opts.notify.apprise_url, timeout).unwrap_or_else(|e| {
        tracing::error!(message = "failed to create notification client", error = %e);
        process::exit(1)
    });
    let ctx = JobContext::new(Arc::new(db), Arc::new(notifier));

    let jobs: Vec<Box<dyn Job>> = vec![Box::new(DownsampleJob::default())];
    let store = StateStore::new(opts.state_file);
    tracing::info!(message = "starting job runner", state_file = %store.path().display(), jobs = jobs.len());

    let mut runner =
        JobRunner::new(jobs, store, ctx).with_poll_interval(Duration::from_millis(opts.poll_interval_ms));
    let supervisor = Supervisor::new(opts.restart.policy());

    tokio::select! {
        res = supervisor.supervise(&mut runner) => res?,
        _ = sigterm() => {}
        _ = sigint() => {}
    }

    tracing::info!("job runner shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
