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

use crate::influx::{DatabaseError, PointSink, SinkConnector};
use crate::metrics::IngestMetrics;
use crate::point::{MetricPoint, ValidationError};
use crate::queue::{InboundMessage, QueueReceiver};
use crate::supervisor::{Unit, UnitError};
use async_trait::async_trait;
use tracing::{Instrument, Level};

/// What happened to a single message taken off the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Written,
    Discarded(ValidationError),
}

/// Consumer that takes raw messages off the ingestion queue one at a time,
/// validates them, and writes the resulting points to the database.
///
/// Messages that fail validation are logged and discarded. Errors writing to the
/// database end the current run so that the supervisor can restart the writer
/// with a new connection. The message being written when that happens has already
/// been taken off the queue and is lost; anything still queued is written after
/// the restart.
#[derive(Debug)]
pub struct Writer<C> {
    queue: QueueReceiver<InboundMessage>,
    connector: C,
    metrics: IngestMetrics,
}

impl<C> Writer<C>
where
    C: SinkConnector,
{
    pub fn new(queue: QueueReceiver<InboundMessage>, connector: C, metrics: IngestMetrics) -> Self {
        Writer {
            queue,
            connector,
            metrics,
        }
    }
}

#[async_trait]
impl<C> Unit for Writer<C>
where
    C: SinkConnector,
{
    fn name(&self) -> &'static str {
        "writer"
    }

    async fn run(&mut self) -> Result<(), UnitError> {
        let sink = self.connector.connect().await?;

        while let Some(msg) = self.queue.dequeue().await {
            process(&sink, &msg, &self.metrics)
                .instrument(tracing::span!(Level::DEBUG, "write_point", received_at = msg.received_at))
                .await?;
        }

        Ok(())
    }
}

/// Validate a single message and, if valid, write it to `sink`. Validation failures
/// are returned as an `Outcome`, database failures as an `Err`.
pub async fn process<S>(sink: &S, msg: &InboundMessage, metrics: &IngestMetrics) -> Result<Outcome, DatabaseError>
where
    S: PointSink + ?Sized,
{
    let point = match MetricPoint::decode(msg) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(
                message = "discarding invalid message",
                payload = %String::from_utf8_lossy(&msg.payload),
                reason = e.kind(),
                error = %e,
            );

            metrics.discarded(&e);
            return Ok(Outcome::Discarded(e));
        }
    };

    sink.write(&point).await?;
    metrics.written();

    tracing::debug!(
        message = "wrote point",
        measurement = %point.measurement,
        bucket = %point.bucket,
        time = point.time,
    );

    Ok(Outcome::Written)
}
