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

use crate::metrics::{AlertMetrics, IngestMetrics, Source};
use crate::queue::{InboundMessage, QueueSender};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use prometheus_client::encoding::text;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const TEXT_FORMAT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// State that can render Prometheus metrics for the `/metrics` endpoint.
pub trait MetricsState: Send + Sync + 'static {
    fn registry(&self) -> &Registry;
}

/// Global state shared between all ingestion HTTP requests via Arc.
pub struct IngestState {
    registry: Registry,
    queue: QueueSender<InboundMessage>,
    metrics: IngestMetrics,
}

impl IngestState {
    pub fn new(registry: Registry, queue: QueueSender<InboundMessage>, metrics: IngestMetrics) -> Self {
        IngestState {
            registry,
            queue,
            metrics,
        }
    }
}

impl MetricsState for IngestState {
    fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Global state shared between all alert webhook HTTP requests via Arc.
pub struct AlertState {
    registry: Registry,
    queue: QueueSender<Bytes>,
    metrics: AlertMetrics,
}

impl AlertState {
    pub fn new(registry: Registry, queue: QueueSender<Bytes>, metrics: AlertMetrics) -> Self {
        AlertState {
            registry,
            queue,
            metrics,
        }
    }
}

impl MetricsState for AlertState {
    fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Routes for the telemetry collector: `POST /` to submit a message and `GET /metrics`.
///
/// Request bodies have no size limit, every submission gets a `204`.
pub fn ingest_router(state: Arc<IngestState>) -> Router {
    Router::new()
        .route("/", post(ingest_handler))
        .route("/metrics", get(text_metrics_handler::<IngestState>))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Routes for the alert relay: `POST /` for InfluxDB notification webhooks and `GET /metrics`.
pub fn alert_router(state: Arc<AlertState>) -> Router {
    Router::new()
        .route("/", post(alert_handler))
        .route("/metrics", get(text_metrics_handler::<AlertState>))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Timestamp and enqueue the raw body of a request. Validation happens later in the
/// writer so this always responds with a `204`, even for garbage.
pub async fn ingest_handler(State(state): State<Arc<IngestState>>, body: Bytes) -> StatusCode {
    let msg = InboundMessage::now(body);
    state.metrics.received(Source::Http);

    if let Err(e) = state.queue.enqueue(msg) {
        tracing::error!(message = "unable to enqueue message", error = %e);
    }

    StatusCode::NO_CONTENT
}

/// Enqueue the raw body of an alert webhook, always responding with a `204`.
pub async fn alert_handler(State(state): State<Arc<AlertState>>, body: Bytes) -> StatusCode {
    state.metrics.received();

    if let Err(e) = state.queue.enqueue(body) {
        tracing::error!(message = "unable to enqueue alert", error = %e);
    }

    StatusCode::NO_CONTENT
}

/// Render Prometheus metrics from a registry in the text exposition format. If an
/// error is encountered, an HTTP 500 will be returned and the error will be logged.
pub async fn text_metrics_handler<S: MetricsState>(State(state): State<Arc<S>>) -> Response {
    let mut buf = String::new();

    match text::encode(&mut buf, state.registry()) {
        Ok(_) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", bytes = buf.len());
            ([(CONTENT_TYPE, TEXT_FORMAT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics to text format", error = %e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod test {
    use super::{alert_router, ingest_router, AlertState, IngestState};
    use crate::metrics::{AlertMetrics, IngestMetrics};
    use crate::queue::{self, InboundMessage, QueueReceiver};
    use crate::supervisor::Unit;
    use crate::writer::test::RecordingConnector;
    use crate::writer::Writer;
    use axum::http::StatusCode;
    use axum::Router;
    use bytes::Bytes;
    use hyper::{Body, Request};
    use prometheus_client::registry::Registry;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn ingest_app() -> (Router, QueueReceiver<InboundMessage>, IngestMetrics) {
        let (tx, rx) = queue::channel();
        let mut registry = <Registry>::default();
        let metrics = IngestMetrics::new(&mut registry);
        let state = Arc::new(IngestState::new(registry, tx, metrics.clone()));
        (ingest_router(state), rx, metrics)
    }

    fn post(body: &'static str) -> Request<Body> {
        Request::builder().method("POST").uri("/").body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_valid_body() {
        let (app, mut rx, _) = ingest_app();
        let body = r#"{"measurement": "water_depth", "fields": {"depth_in_meters": 1.2}}"#;

        let res = app.oneshot(post(body)).await.unwrap();
        assert_eq!(StatusCode::NO_CONTENT, res.status());

        let msg = rx.dequeue().await.unwrap();
        assert_eq!(Bytes::from_static(body.as_bytes()), msg.payload);
        assert!(msg.received_at > 0);
    }

    #[tokio::test]
    async fn test_ingest_malformed_body_still_no_content() {
        let (app, mut rx, _) = ingest_app();

        let res = app.oneshot(post("{not json")).await.unwrap();
        assert_eq!(StatusCode::NO_CONTENT, res.status());

        // Enqueued anyway, the writer is responsible for validation
        let msg = rx.dequeue().await.unwrap();
        assert_eq!(Bytes::from_static(b"{not json"), msg.payload);
    }

    #[tokio::test]
    async fn test_ingest_queue_closed_still_no_content() {
        let (app, rx, _) = ingest_app();
        drop(rx);

        let res = app.oneshot(post("{}")).await.unwrap();
        assert_eq!(StatusCode::NO_CONTENT, res.status());
    }

    #[tokio::test]
    async fn test_ingest_large_body_still_no_content() {
        let (app, mut rx, _) = ingest_app();
        let body = vec![b'x'; 3 * 1024 * 1024];
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from(body.clone()))
            .unwrap();

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(StatusCode::NO_CONTENT, res.status());

        let msg = rx.dequeue().await.unwrap();
        assert_eq!(body.len(), msg.payload.len());
    }

    #[tokio::test]
    async fn test_ingest_get_not_allowed() {
        let (app, _rx, _) = ingest_app();
        let req = Request::builder().method("GET").uri("/").body(Body::empty()).unwrap();

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(StatusCode::METHOD_NOT_ALLOWED, res.status());
    }

    #[tokio::test]
    async fn test_ingest_through_writer() {
        let (app, rx, metrics) = ingest_app();
        let bodies = [
            r#"{"measurement": "power", "tags": {"phase": "l1"}, "fields": {"watts": 230}, "bucket": "meter"}"#,
            "not json",
            r#"{"fields": {"v": 1}}"#,
            r#"{"measurement": "m", "tags": {"room": 1}, "fields": {"v": 1}}"#,
            r#"{"measurement": "m", "fields": {}}"#,
            r#"{"measurement": "gas", "fields": {"m3": 1.5}, "time": "1700000000000000000"}"#,
        ];

        for body in bodies {
            let res = app.clone().oneshot(post(body)).await.unwrap();
            assert_eq!(StatusCode::NO_CONTENT, res.status());
        }

        // Dropping the router drops the last sender so the writer finishes once the
        // queue has been drained.
        drop(app);

        let connector = RecordingConnector::default();
        let mut writer = Writer::new(rx, connector.clone(), metrics);
        writer.run().await.unwrap();

        let points = connector.sink.points();
        assert_eq!(2, points.len());
        assert_eq!("power", points[0].measurement);
        assert_eq!("meter", points[0].bucket);
        assert_eq!("gas", points[1].measurement);
        assert_eq!("default", points[1].bucket);
        assert_eq!(1_700_000_000_000_000_000, points[1].time);
    }

    #[tokio::test]
    async fn test_ingest_metrics() {
        let (app, _rx, _) = ingest_app();
        app.clone().oneshot(post("{}")).await.unwrap();

        let req = Request::builder().method("GET").uri("/metrics").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(StatusCode::OK, res.status());

        let body = hyper::body::to_bytes(res.into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("homewatch_messages_received_total{source=\"http\"} 1"));
    }

    #[tokio::test]
    async fn test_alert_enqueued() {
        let (tx, mut rx) = queue::channel();
        let mut registry = <Registry>::default();
        let metrics = AlertMetrics::new(&mut registry);
        let app = alert_router(Arc::new(AlertState::new(registry, tx, metrics)));

        let res = app.oneshot(post(r#"{"_version": 1}"#)).await.unwrap();
        assert_eq!(StatusCode::NO_CONTENT, res.status());
        assert_eq!(Bytes::from_static(br#"{"_version": 1}"#), rx.dequeue().await.unwrap());
    }

    #[tokio::test]
    async fn test_alert_large_body_still_no_content() {
        let (tx, mut rx) = queue::channel();
        let mut registry = <Registry>::default();
        let metrics = AlertMetrics::new(&mut registry);
        let app = alert_router(Arc::new(AlertState::new(registry, tx, metrics)));
        let body = vec![b'{'; 3 * 1024 * 1024];
        let req = Request::builder().method("POST").uri("/").body(Body::from(body)).unwrap();

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(StatusCode::NO_CONTENT, res.status());
        assert_eq!(3 * 1024 * 1024, rx.dequeue().await.unwrap().len());
    }
}
