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

//! Command line arguments shared between binaries. Every setting for an external
//! system can also be given as an environment variable. Required settings that are
//! missing from both cause the process to exit at startup.

use crate::influx::{InfluxConfig, DEFAULT_TIMEOUT};
use crate::mqtt::{MqttConfig, DEFAULT_CLIENT_ID, DEFAULT_MAX_PACKET_SIZE, DEFAULT_TOPIC};
use crate::supervisor::RestartPolicy;
use clap::Args;
use std::time::Duration;

const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_RESTART_DELAY_MS: u64 = 1000;
const DEFAULT_TIMEOUT_MS: u64 = DEFAULT_TIMEOUT.as_millis() as u64;

#[derive(Debug, Clone, Args)]
pub struct InfluxArgs {
    /// URL of the InfluxDB server, e.g. 'http://influxdb:8086'
    #[arg(long, env = "INFLUX_URL")]
    pub influx_url: String,

    /// API token used to authenticate with InfluxDB
    #[arg(long, env = "INFLUX_TOKEN", hide_env_values = true)]
    pub influx_token: String,

    /// InfluxDB organization to read from and write to
    #[arg(long, env = "INFLUX_ORG")]
    pub influx_org: String,
}

impl InfluxArgs {
    pub fn into_config(self, timeout: Duration) -> InfluxConfig {
        InfluxConfig {
            url: self.influx_url,
            token: self.influx_token,
            org: self.influx_org,
            timeout,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct MqttArgs {
    /// Address of an MQTT broker to receive telemetry from. If not set, telemetry is
    /// only accepted over HTTP
    #[arg(long, env = "MQTT_BROKER_ADDRESS")]
    pub mqtt_broker_address: Option<String>,

    /// Port of the MQTT broker
    #[arg(long, env = "MQTT_BROKER_PORT", default_value_t = DEFAULT_MQTT_PORT)]
    pub mqtt_broker_port: u16,

    /// Topic to subscribe to for telemetry
    #[arg(long, env = "MQTT_TOPIC", default_value = DEFAULT_TOPIC)]
    pub mqtt_topic: String,

    /// Client ID to use when connecting to the MQTT broker
    #[arg(long, env = "MQTT_CLIENT_ID", default_value = DEFAULT_CLIENT_ID)]
    pub mqtt_client_id: String,

    /// Largest message accepted from the broker, in bytes. Larger messages cause a
    /// disconnect and reconnect
    #[arg(long, env = "MQTT_MAX_PACKET_SIZE", default_value_t = DEFAULT_MAX_PACKET_SIZE)]
    pub mqtt_max_packet_size: usize,
}

impl MqttArgs {
    /// Subscriber settings, if a broker was configured.
    pub fn config(&self) -> Option<MqttConfig> {
        self.mqtt_broker_address.as_ref().map(|host| MqttConfig {
            host: host.clone(),
            port: self.mqtt_broker_port,
            topic: self.mqtt_topic.clone(),
            client_id: self.mqtt_client_id.clone(),
            max_packet_size: self.mqtt_max_packet_size,
        })
    }
}

#[derive(Debug, Clone, Args)]
pub struct NotifyArgs {
    /// URL of the Apprise API endpoint notifications are posted to
    #[arg(long, env = "APPRISE_URL")]
    pub apprise_url: String,
}

#[derive(Debug, Clone, Args)]
pub struct RestartArgs {
    /// Time to wait before restarting a part of the process that failed, in milliseconds
    #[arg(long, default_value_t = DEFAULT_RESTART_DELAY_MS)]
    pub restart_delay_ms: u64,
}

impl RestartArgs {
    pub fn policy(&self) -> RestartPolicy {
        RestartPolicy::fixed(Duration::from_millis(self.restart_delay_ms))
    }
}

#[derive(Debug, Clone, Args)]
pub struct TimeoutArgs {
    /// Give up on a request to InfluxDB or Apprise that hasn't completed after this
    /// long, in milliseconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub request_timeout_ms: u64,
}

impl TimeoutArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod test {
    use super::{InfluxArgs, MqttArgs, NotifyArgs, RestartArgs, TimeoutArgs};
    use clap::Parser;
    use std::time::Duration;

    #[derive(Debug, Parser)]
    struct TestApplication {
        #[command(flatten)]
        influx: InfluxArgs,

        #[command(flatten)]
        mqtt: MqttArgs,

        #[command(flatten)]
        notify: NotifyArgs,

        #[command(flatten)]
        restart: RestartArgs,

        #[command(flatten)]
        timeout: TimeoutArgs,
    }

    #[test]
    fn test_parse_flags() {
        let app = TestApplication::try_parse_from([
            "test",
            "--influx-url",
            "http://influxdb:8086",
            "--influx-token",
            "secret",
            "--influx-org",
            "home",
            "--apprise-url",
            "http://apprise:8000/notify/apprise",
            "--mqtt-broker-address",
            "mosquitto",
            "--restart-delay-ms",
            "250",
            "--request-timeout-ms",
            "2500",
        ])
        .unwrap();

        let influx = app.influx.into_config(app.timeout.timeout());
        assert_eq!("http://influxdb:8086", influx.url);
        assert_eq!("secret", influx.token);
        assert_eq!("home", influx.org);
        assert_eq!(Duration::from_millis(2500), influx.timeout);

        let mqtt = app.mqtt.config().unwrap();
        assert_eq!("mosquitto", mqtt.host);
        assert_eq!(1883, mqtt.port);
        assert_eq!("homewatch/ingest", mqtt.topic);
        assert_eq!(1024 * 1024, mqtt.max_packet_size);

        assert_eq!(Duration::from_millis(250), app.restart.policy().delay());
    }

    #[test]
    fn test_mqtt_optional() {
        let app = TestApplication::try_parse_from([
            "test",
            "--influx-url",
            "http://influxdb:8086",
            "--influx-token",
            "secret",
            "--influx-org",
            "home",
            "--apprise-url",
            "http://apprise:8000/notify/apprise",
        ])
        .unwrap();

        assert_eq!(None, app.mqtt.config());
        assert_eq!(Duration::from_secs(1), app.restart.policy().delay());
        assert_eq!(Duration::from_secs(10), app.timeout.timeout());
    }

    #[test]
    fn test_missing_required_setting() {
        let res = TestApplication::try_parse_from(["test", "--influx-url", "http://influxdb:8086"]);
        assert!(res.is_err());
    }
}
