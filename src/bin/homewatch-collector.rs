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
use homewatch::config::{InfluxArgs, MqttArgs, RestartArgs, TimeoutArgs};
use homewatch::http::IngestState;
use homewatch::metrics::IngestMetrics;
use homewatch::mqtt::MqttSubscriber;
use homewatch::supervisor::{Supervisor, Unit};
use homewatch::writer::Writer;
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::{io, process};
use tokio::signal::unix::{self, SignalKind};
use tokio::task;
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8080);

/// Collect JSON telemetry messages over HTTP and MQTT and write them to InfluxDB
///
/// Messages sent to `POST /` (or published to the MQTT topic, if a broker is
/// configured) are timestamped when they arrive and queued. A single writer
/// validates each message in order and writes it to InfluxDB as a point. Messages
/// that aren't valid are logged and dropped. Submitters always get a `204` response
/// since validation happens after the request has completed.
#[derive(Debug, Parser)]
#[clap(name = "homewatch-collector", version = clap::crate_version ! ())]
struct CollectorApplication {
    #[command(flatten)]
    influx: InfluxArgs,

    #[command(flatten)]
    mqtt: MqttArgs,

    #[command(flatten)]
    restart: RestartArgs,

    #[command(flatten)]
    timeout: TimeoutArgs,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[arg(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Address to bind to. By default, the collector will bind to a public address
    /// since the purpose is to accept telemetry from other machines
    #[arg(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = CollectorApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let mut registry = <Registry>::default();
    let metrics = IngestMetrics::new(&mut registry);
    let supervisor = Supervisor::new(opts.restart.policy());
    let (sender, receiver) = homewatch::queue::channel();

    let writer = Writer::new(receiver, opts.influx.into_config(opts.timeout.timeout()), metrics.clone());
    spawn_supervised(supervisor.clone(), writer);

    match opts.mqtt.config() {
        Some(config) => {
            tracing::info!(message = "subscribing to broker", host = %config.host, port = config.port, topic = %config.topic);
            let subscriber = MqttSubscriber::new(config, sender.clone(), metrics.clone());
            spawn_supervised(supervisor.clone(), subscriber);
        }
        None => {
            tracing::info!("no broker configured, accepting telemetry over HTTP only");
        }
    }

    let state = Arc::new(IngestState::new(registry, sender, metrics));
    let app = homewatch::http::ingest_router(state);

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

/// Run a unit in the background, restarting it whenever it fails
fn spawn_supervised<U: Unit + 'static>(supervisor: Supervisor, mut unit: U) {
    task::spawn(async move {
        if let Err(e) = supervisor.supervise(&mut unit).await {
            tracing::error!(message = "unit stopped", unit = unit.name(), error = %e);
        }
    });
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
