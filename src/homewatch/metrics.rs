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

use crate::point::ValidationError;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct SourceLabels {
    source: String,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: String,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: String,
}

/// Adapter a message was received by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Http,
    Mqtt,
}

impl Source {
    pub fn as_label(&self) -> &'static str {
        match self {
            Source::Http => "http",
            Source::Mqtt => "mqtt",
        }
    }
}

/// Collection of Prometheus metrics updated as telemetry moves from the inbound
/// adapters through the validating writer. Cheap to clone, clones share the same
/// underlying counters.
#[derive(Debug, Clone)]
pub struct IngestMetrics {
    received: Family<SourceLabels, Counter>,
    written: Counter,
    discarded: Family<KindLabels, Counter>,
    last_write: Gauge<f64, AtomicU64>,
}

impl IngestMetrics {
    pub fn new(reg: &mut Registry) -> Self {
        let received = Family::<SourceLabels, Counter>::default();
        let written = Counter::default();
        let discarded = Family::<KindLabels, Counter>::default();
        let last_write = Gauge::<f64, AtomicU64>::default();

        reg.register(
            "homewatch_messages_received",
            "Number of messages enqueued by source",
            received.clone(),
        );
        reg.register(
            "homewatch_points_written",
            "Number of points written to the database",
            written.clone(),
        );
        reg.register(
            "homewatch_messages_discarded",
            "Number of messages discarded by validation failure type",
            discarded.clone(),
        );
        reg.register(
            "homewatch_last_write_timestamp",
            "Timestamp of the last successful write",
            last_write.clone(),
        );

        Self {
            received,
            written,
            discarded,
            last_write,
        }
    }

    pub fn received(&self, source: Source) {
        self.received
            .get_or_create(&SourceLabels {
                source: source.as_label().to_owned(),
            })
            .inc();
    }

    pub fn written(&self) {
        self.written.inc();

        // If we can't get the number of seconds since the epoch, skip the update
        let _ = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| self.last_write.set(d.as_secs_f64()));
    }

    pub fn discarded(&self, err: &ValidationError) {
        self.discarded
            .get_or_create(&KindLabels {
                kind: err.kind().to_owned(),
            })
            .inc();
    }
}

/// Final state of an alert handled by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    Sent,
    Invalid,
    Failed,
}

impl AlertOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            AlertOutcome::Sent => "sent",
            AlertOutcome::Invalid => "invalid",
            AlertOutcome::Failed => "failed",
        }
    }
}

/// Prometheus metrics for alerts relayed as notifications.
#[derive(Debug, Clone)]
pub struct AlertMetrics {
    received: Counter,
    alerts: Family<OutcomeLabels, Counter>,
}

impl AlertMetrics {
    pub fn new(reg: &mut Registry) -> Self {
        let received = Counter::default();
        let alerts = Family::<OutcomeLabels, Counter>::default();

        reg.register(
            "homewatch_alerts_received",
            "Number of alerts received via webhook",
            received.clone(),
        );
        reg.register("homewatch_alerts", "Number of alerts handled by outcome", alerts.clone());

        Self { received, alerts }
    }

    pub fn received(&self) {
        self.received.inc();
    }

    pub fn outcome(&self, outcome: AlertOutcome) {
        self.alerts
            .get_or_create(&OutcomeLabels {
                outcome: outcome.as_label().to_owned(),
            })
            .inc();
    }
}
