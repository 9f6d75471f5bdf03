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
use homewatch::config::{NotifyArgs, RestartArgs, TimeoutArgs};
use homewatch::http::AlertState;
use homewatch::metrics::AlertMetrics;
use homewatch::notify::AppriseNotifier;
use homewatch::relay::Relay;
use homewatch::supervisor::{Supervisor, Unit};
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::{io, process};
use tokio::signal::unix::{self, SignalKind};
use tokio::task;
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 80);

/// Forward InfluxDB check notifications to Apprise
///
/// InfluxDB notification endpoints should be configured to send webhooks to
/// `POST /`. Each alert is turned into a plain text notification with the name
/// and status of the check and sent to the configured Apprise endpoint. Alerts
/// are handled one at a time in the order they arrive.
#[derive(Debug, Parser)]
#[clap(name = "homewatch-alerts", version = clap::crate_version ! ())]
struct AlertsApplication {
    #[command(flatten)]
    notify: NotifyArgs,

    #[command(flatten)]
    restart: RestartArgs,

    #[command(flatten)]
    timeout: TimeoutArgs,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[arg(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Address to bind to. By default, the relay will bind to a public address since
    /// InfluxDB usually runs on another machine or container
    #[arg(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = AlertsApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let mut registry = <Registry>::default();
    let metrics = AlertMetrics::new(&mut registry);
    let supervisor = Supervisor::new(opts.restart.policy());
    let (sender, receiver) = homewatch::queue::channel();

    let notifier = AppriseNotifier::new(opts.notify.apprise_url, opts.timeout.timeout()).unwrap_or_else(|e| {
        tracing::error!(message = "failed to create notification client", error = %e);
        process::exit(1)
    });
    let mut relay = Relay::new(receiver, notifier, metrics.clone());
    task::spawn(async move {
        if let Err(e) = supervisor.supervise(&mut relay).await {
            tracing::error!(message = "unit stopped", unit = relay.name(), error = %e);
        }
    });

    let state = Arc::new(AlertState::new(registry, sender, metrics));
    let app = homewatch::http::alert_router(state);

    let server = axum::Server::try_bind(&opts.bind)
        .map(|s| {
            s.serve(app.into_make_service()).with_graceful_shutdown(async {
                // Wait for either SIGTERM or SIGINT to shutdown
                tokio::select! {
                    _ = sigterm() => {}
                    _ = sigint() => {}
                }
            })
        })
        .unwrap_or_else(|e| {
            tracing::error!(message = "error starting server", address = %opts.bind, err = %e);
            process::exit(1)
        });

    tracing::info!(message = "starting server", address = %opts.bind);
    server.await?;

    tracing::info!("server shutdown");
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
