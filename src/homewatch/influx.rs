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

use crate::point::MetricPoint;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use std::fmt;
use std::time::Duration;

const FLUX_CONTENT_TYPE: &str = "application/vnd.flux";
const LINE_PROTOCOL_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error talking to InfluxDB, either at the transport level or because it
/// returned a non-success status.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("request to database failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("database returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Connection settings for an InfluxDB 2.x server. `timeout` bounds each request
/// from connecting until the whole response has been read.
#[derive(Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub timeout: Duration,
}

impl fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("org", &self.org)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Something metric points can be written to.
#[async_trait]
pub trait PointSink: Send + Sync {
    /// Write a single point, returning only once the write has been accepted.
    async fn write(&self, point: &MetricPoint) -> Result<(), DatabaseError>;
}

/// Factory for new `PointSink` instances, used to get a fresh connection each
/// time a consumer is restarted.
#[async_trait]
pub trait SinkConnector: Send + Sync {
    type Sink: PointSink;

    async fn connect(&self) -> Result<Self::Sink, DatabaseError>;
}

/// Something Flux queries can be run against.
#[async_trait]
pub trait FluxQuery: Send + Sync {
    /// Run a Flux script and return the raw annotated CSV response.
    async fn query(&self, flux: &str) -> Result<String, DatabaseError>;
}

/// Minimal client for the InfluxDB 2.x HTTP API.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    config: InfluxConfig,
    client: Client,
}

impl InfluxClient {
    pub fn new(config: InfluxConfig) -> Result<Self, DatabaseError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: InfluxConfig, client: Client) -> Self {
        InfluxClient { config, client }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn auth(&self) -> String {
        format!("Token {}", self.config.token)
    }

    /// Make sure the server is reachable.
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        let res = self.client.get(self.endpoint("/ping")).send().await?;
        check_status(res).await.map(|_| ())
    }
}

#[async_trait]
impl PointSink for InfluxClient {
    async fn write(&self, point: &MetricPoint) -> Result<(), DatabaseError> {
        let res = self
            .client
            .post(self.endpoint("/api/v2/write"))
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", point.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, self.auth())
            .header(CONTENT_TYPE, LINE_PROTOCOL_CONTENT_TYPE)
            .body(point.to_line_protocol())
            .send()
            .await?;

        check_status(res).await.map(|_| ())
    }
}

#[async_trait]
impl FluxQuery for InfluxClient {
    async fn query(&self, flux: &str) -> Result<String, DatabaseError> {
        let res = self
            .client
            .post(self.endpoint("/api/v2/query"))
            .query(&[("org", self.config.org.as_str())])
            .header(AUTHORIZATION, self.auth())
            .header(CONTENT_TYPE, FLUX_CONTENT_TYPE)
            .body(flux.to_owned())
            .send()
            .await?;

        Ok(check_status(res).await?.text().await?)
    }
}

#[async_trait]
impl SinkConnector for InfluxConfig {
    type Sink = InfluxClient;

    /// Create a new client and ping the server so that a database that's down is
    /// noticed before taking anything off the queue.
    async fn connect(&self) -> Result<InfluxClient, DatabaseError> {
        let client = InfluxClient::new(self.clone())?;
        client.ping().await?;

        tracing::info!(message = "connected to influxdb", url = %self.url);
        Ok(client)
    }
}

async fn check_status(res: Response) -> Result<Response, DatabaseError> {
    let status = res.status();
    if status.is_success() {
        Ok(res)
    } else {
        let body = res.text().await.unwrap_or_else(|_| "<unreadable body>".to_owned());
        Err(DatabaseError::Status { status, body })
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::{DatabaseError, InfluxClient, InfluxConfig, PointSink, DEFAULT_TIMEOUT};
    use crate::point::{FieldValue, MetricPoint};
    use std::collections::BTreeMap;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn config(url: &str) -> InfluxConfig {
        InfluxConfig {
            url: url.to_owned(),
            token: "secret".to_owned(),
            org: "home".to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Start a server that accepts connections and then never responds.
    pub(crate) async fn unresponsive_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                open.push(stream);
            }
        });

        addr
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        let client = InfluxClient::new(config("http://influxdb:8086/")).unwrap();
        assert_eq!("http://influxdb:8086/api/v2/write", client.endpoint("/api/v2/write"));
    }

    #[test]
    fn test_endpoint_no_trailing_slash() {
        let client = InfluxClient::new(config("http://influxdb:8086")).unwrap();
        assert_eq!("http://influxdb:8086/ping", client.endpoint("/ping"));
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let debug = format!("{:?}", config("http://influxdb:8086"));
        assert!(!debug.contains("secret"));
        assert!(debug.contains("home"));
    }

    #[tokio::test]
    async fn test_write_times_out() {
        let addr = unresponsive_server().await;
        let mut config = config(&format!("http://{}", addr));
        config.timeout = Duration::from_millis(100);
        let client = InfluxClient::new(config).unwrap();

        let mut fields = BTreeMap::new();
        fields.insert("v".to_owned(), FieldValue::Integer(1));
        let point = MetricPoint {
            measurement: "m".to_owned(),
            tags: BTreeMap::new(),
            fields,
            time: 1,
            bucket: "default".to_owned(),
        };

        match client.write(&point).await {
            Err(DatabaseError::Http(e)) => assert!(e.is_timeout()),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
