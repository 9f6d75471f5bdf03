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

use crate::alert::Alert;
use crate::metrics::{AlertMetrics, AlertOutcome};
use crate::notify::Notifier;
use crate::queue::QueueReceiver;
use crate::supervisor::{Unit, UnitError};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{Instrument, Level};

/// Consumer that turns alert webhook payloads into notifications.
///
/// Each alert is parsed, rendered, and sent before the next one is taken off the
/// queue. Alerts that can't be parsed and notifications that can't be delivered
/// are logged and dropped.
#[derive(Debug)]
pub struct Relay<N> {
    queue: QueueReceiver<Bytes>,
    notifier: N,
    metrics: AlertMetrics,
}

impl<N> Relay<N>
where
    N: Notifier,
{
    pub fn new(queue: QueueReceiver<Bytes>, notifier: N, metrics: AlertMetrics) -> Self {
        Relay {
            queue,
            notifier,
            metrics,
        }
    }

    /// Parse, render, and send a single alert.
    pub async fn relay(&self, payload: &[u8]) -> AlertOutcome {
        let alert = match Alert::parse(payload) {
            Ok(a) => a,
            Err(e) => {
                tracing::error!(
                    message = "invalid alert",
                    payload = %String::from_utf8_lossy(payload),
                    error = %e,
                );
                return AlertOutcome::Invalid;
            }
        };

        let notification = alert.render();
        tracing::info!(message = "sending notification", check = %alert.check_name, level = %alert.level);

        match self.notifier.send(&notification).await {
            Ok(_) => AlertOutcome::Sent,
            Err(e) => {
                tracing::error!(message = "failed to send notification", check = %alert.check_name, error = %e);
                AlertOutcome::Failed
            }
        }
    }
}

#[async_trait]
impl<N> Unit for Relay<N>
where
    N: Notifier,
{
    fn name(&self) -> &'static str {
        "alert_relay"
    }

    async fn run(&mut self) -> Result<(), UnitError> {
        while let Some(payload) = self.queue.dequeue().await {
            let outcome = self
                .relay(&payload)
                .instrument(tracing::span!(Level::DEBUG, "relay_alert"))
                .await;

            self.metrics.outcome(outcome);
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::Relay;
    use crate::metrics::{AlertMetrics, AlertOutcome};
    use crate::notify::test::RecordingNotifier;
    use crate::queue;
    use crate::supervisor::Unit;
    use bytes::Bytes;
    use prometheus_client::registry::Registry;
    use std::sync::atomic::Ordering;

    const DEADMAN: &[u8] = br#"{"_version":1,"_check_name":"X","_level":"crit","_type":"deadman","dead":true}"#;

    fn metrics() -> AlertMetrics {
        AlertMetrics::new(&mut <Registry>::default())
    }

    #[tokio::test]
    async fn test_relay_sends_notification() {
        let (_tx, rx) = queue::channel();
        let notifier = RecordingNotifier::default();
        let relay = Relay::new(rx, notifier.clone(), metrics());

        assert_eq!(AlertOutcome::Sent, relay.relay(DEADMAN).await);

        let sent = notifier.sent();
        assert_eq!(1, sent.len());
        assert!(sent[0].body.contains("Dead: true"));
    }

    #[tokio::test]
    async fn test_relay_unsupported_version() {
        let (_tx, rx) = queue::channel();
        let notifier = RecordingNotifier::default();
        let relay = Relay::new(rx, notifier.clone(), metrics());

        let payload = br#"{"_version":2,"_check_name":"X","_level":"crit","_type":"deadman","dead":true}"#;
        assert_eq!(AlertOutcome::Invalid, relay.relay(payload).await);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_relay_send_failure() {
        let (_tx, rx) = queue::channel();
        let notifier = RecordingNotifier::default();
        notifier.fail.store(true, Ordering::SeqCst);
        let relay = Relay::new(rx, notifier.clone(), metrics());

        assert_eq!(AlertOutcome::Failed, relay.relay(DEADMAN).await);
    }

    #[tokio::test]
    async fn test_relay_run_continues_after_errors() {
        let (tx, rx) = queue::channel();
        let notifier = RecordingNotifier::default();
        let mut relay = Relay::new(rx, notifier.clone(), metrics());

        tx.enqueue(Bytes::from_static(b"not json")).unwrap();
        tx.enqueue(Bytes::from_static(br#"{"_version": 2}"#)).unwrap();
        tx.enqueue(Bytes::from_static(DEADMAN)).unwrap();
        drop(tx);

        relay.run().await.unwrap();

        let sent = notifier.sent();
        assert_eq!(1, sent.len());
        assert_eq!("Alert for check: \"X\"", sent[0].title);
    }
}
