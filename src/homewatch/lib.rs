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

//! Collect home monitoring telemetry into InfluxDB, relay InfluxDB alerts as
//! notifications, and run periodic maintenance jobs.
//!
//! ## Features
//!
//! Homewatch is made up of three programs that each run independently:
//!
//! * `homewatch-collector` - Accepts JSON telemetry messages over HTTP (`POST /`) and,
//!   optionally, from an MQTT topic. Messages are timestamped on arrival, queued, then
//!   validated and written to InfluxDB one at a time. Invalid messages are logged and
//!   dropped.
//! * `homewatch-alerts` - Accepts InfluxDB check notification webhooks (`POST /`) and
//!   forwards them as human readable notifications to an [Apprise](https://github.com/caronc/apprise-api)
//!   endpoint.
//! * `homewatch-jobs` - Runs periodic jobs against InfluxDB, such as downsampling smart
//!   meter data, remembering the state of each job in a JSON file between restarts.
//!
//! Each part of each program that talks to an external system is restarted after a
//! short delay when that system fails.
//!
//! ## Messages
//!
//! Telemetry messages are JSON objects like the one below. `bucket` is optional and
//! defaults to `default`. Field values may be numbers, booleans, or strings.
//!
//! ```json
//! {
//!   "measurement": "temperature",
//!   "tags": {"room": "kitchen"},
//!   "fields": {"celsius": 21.5},
//!   "bucket": "home"
//! }
//! ```
//!
//! ## Metrics
//!
//! The collector and the alert relay both expose Prometheus metrics at `/metrics`.
//!
//! * `homewatch_messages_received_total` - Messages received by source (`http` or `mqtt`).
//! * `homewatch_points_written_total` - Points successfully written to InfluxDB.
//! * `homewatch_messages_discarded_total` - Messages discarded by validation failure type.
//! * `homewatch_last_write_timestamp` - UNIX timestamp of the last successful write.
//! * `homewatch_alerts_received_total` - Alert webhooks received.
//! * `homewatch_alerts_total` - Alerts handled by outcome (`sent`, `invalid`, `failed`).
//!
//! ## Configuration
//!
//! Settings for external systems may be given as flags or environment variables.
//!
//! ```text
//! INFLUX_URL=http://influxdb:8086 INFLUX_TOKEN=... INFLUX_ORG=home \
//!     MQTT_BROKER_ADDRESS=mosquitto homewatch-collector
//! APPRISE_URL=http://apprise:8000/notify/apprise homewatch-alerts
//! INFLUX_URL=http://influxdb:8086 INFLUX_TOKEN=... INFLUX_ORG=home \
//!     APPRISE_URL=http://apprise:8000/notify/apprise homewatch-jobs --state-file data/states.json
//! ```
//!

pub mod alert;
pub mod config;
pub mod http;
pub mod influx;
pub mod jobs;
pub mod metrics;
pub mod mqtt;
pub mod notify;
pub mod point;
pub mod queue;
pub mod relay;
pub mod supervisor;
pub mod writer;
