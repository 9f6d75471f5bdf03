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

use crate::metrics::{IngestMetrics, Source};
use crate::queue::{InboundMessage, QueueClosed, QueueSender};
use crate::supervisor::{Unit, UnitError};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;

pub const DEFAULT_TOPIC: &str = "homewatch/ingest";
pub const DEFAULT_CLIENT_ID: &str = "homewatch-collector";
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1024 * 1024;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 10;

/// Broker address and the single topic to subscribe to. A publish larger than
/// `max_packet_size` bytes ends the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub max_packet_size: usize,
}

impl MqttConfig {
    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(KEEP_ALIVE);
        // No durable subscription: anything published while disconnected is lost
        options.set_clean_session(true);
        options.set_max_packet_size(self.max_packet_size, self.max_packet_size);
        options
    }
}

/// Inbound adapter that subscribes to a topic and enqueues every message delivered
/// on it, stamped with the time it was received.
///
/// Each run makes a new connection to the broker. The topic is (re)subscribed
/// every time the broker acknowledges a connection. Connection errors end the
/// run so that the supervisor can reconnect after its restart delay.
#[derive(Debug)]
pub struct MqttSubscriber {
    config: MqttConfig,
    queue: QueueSender<InboundMessage>,
    metrics: IngestMetrics,
}

impl MqttSubscriber {
    pub fn new(config: MqttConfig, queue: QueueSender<InboundMessage>, metrics: IngestMetrics) -> Self {
        MqttSubscriber { config, queue, metrics }
    }

    fn on_publish(&self, payload: Bytes) -> Result<(), QueueClosed> {
        self.metrics.received(Source::Mqtt);
        self.queue.enqueue(InboundMessage::now(payload))
    }
}

#[async_trait]
impl Unit for MqttSubscriber {
    fn name(&self) -> &'static str {
        "mqtt_subscriber"
    }

    async fn run(&mut self) -> Result<(), UnitError> {
        let (client, mut eventloop) = AsyncClient::new(self.config.options(), REQUEST_CAPACITY);

        loop {
            match eventloop.poll().await? {
                Event::Incoming(Packet::ConnAck(_)) => {
                    tracing::info!(
                        message = "connected to broker",
                        host = %self.config.host,
                        port = self.config.port,
                        topic = %self.config.topic,
                    );

                    client.try_subscribe(self.config.topic.as_str(), QoS::AtMostOnce)?;
                }
                Event::Incoming(Packet::Publish(publish)) => {
                    tracing::debug!(message = "received message", topic = %publish.topic, bytes = publish.payload.len());

                    if self.on_publish(publish.payload).is_err() {
                        tracing::info!(message = "ingestion queue closed, disconnecting from broker");
                        // Best effort, we're done with this connection either way
                        let _ = client.try_disconnect();
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{MqttConfig, MqttSubscriber, DEFAULT_CLIENT_ID, DEFAULT_MAX_PACKET_SIZE, DEFAULT_TOPIC};
    use crate::metrics::IngestMetrics;
    use crate::queue;
    use bytes::Bytes;
    use prometheus_client::registry::Registry;

    fn config() -> MqttConfig {
        MqttConfig {
            host: "mosquitto".to_owned(),
            port: 1883,
            topic: DEFAULT_TOPIC.to_owned(),
            client_id: DEFAULT_CLIENT_ID.to_owned(),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    #[test]
    fn test_options() {
        let options = config().options();

        assert_eq!(("mosquitto".to_owned(), 1883), options.broker_address());
        assert_eq!(DEFAULT_CLIENT_ID, options.client_id());
        assert!(options.clean_session());
        assert_eq!(DEFAULT_MAX_PACKET_SIZE, options.max_packet_size());
    }

    #[tokio::test]
    async fn test_on_publish_enqueues_in_order() {
        let (tx, mut rx) = queue::channel();
        let metrics = IngestMetrics::new(&mut <Registry>::default());
        let subscriber = MqttSubscriber::new(config(), tx, metrics);

        subscriber.on_publish(Bytes::from_static(b"first")).unwrap();
        subscriber.on_publish(Bytes::from_static(b"second")).unwrap();

        let first = rx.dequeue().await.unwrap();
        let second = rx.dequeue().await.unwrap();
        assert_eq!(Bytes::from_static(b"first"), first.payload);
        assert_eq!(Bytes::from_static(b"second"), second.payload);
        assert!(second.received_at >= first.received_at);
    }

    #[tokio::test]
    async fn test_on_publish_queue_closed() {
        let (tx, rx) = queue::channel();
        drop(rx);

        let metrics = IngestMetrics::new(&mut <Registry>::default());
        let subscriber = MqttSubscriber::new(config(), tx, metrics);
        assert!(subscriber.on_publish(Bytes::from_static(b"lost")).is_err());
    }
}
