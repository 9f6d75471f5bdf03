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

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_TAG: &str = "all";

/// Error delivering a notification to the gateway.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("request to notification gateway failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("notification gateway returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Rendered notification ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub tag: String,
}

impl Notification {
    pub fn new<T, B>(title: T, body: B, tags: &[&str]) -> Self
    where
        T: Into<String>,
        B: Into<String>,
    {
        Notification {
            title: title.into(),
            body: body.into(),
            tag: tags.join(", "),
        }
    }
}

/// Something that can deliver notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Send notifications to an Apprise API server as form data (`title`, `body`, `tag`).
#[derive(Debug, Clone)]
pub struct AppriseNotifier {
    url: String,
    client: Client,
}

impl AppriseNotifier {
    /// Create a notifier whose requests fail once `timeout` has elapsed.
    pub fn new<S: Into<String>>(url: S, timeout: Duration) -> Result<Self, NotifyError> {
        Ok(AppriseNotifier {
            url: url.into(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl Notifier for AppriseNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let res = self.client.post(&self.url).form(notification).send().await?;
        let status = res.status();

        if !status.is_success() {
            let body = res.text().await.unwrap_or_else(|_| "<unreadable body>".to_owned());
            return Err(NotifyError::Status { status, body });
        }

        tracing::debug!(message = "notification delivered", url = %self.url, status = %status);
        Ok(())
    }
}
