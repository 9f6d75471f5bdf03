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

use crate::notify::{Notification, DEFAULT_TAG};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Write;

const SUPPORTED_VERSION: u64 = 1;
const DEADMAN_TYPE: &str = "deadman";

/// Fields InfluxDB adds to every alert that only matter to InfluxDB itself.
const METADATA_FIELDS: &[&str] = &[
    "_check_id",
    "_measurement",
    "_notification_endpoint_id",
    "_notification_endpoint_name",
    "_notification_rule_id",
    "_version",
];

/// Reasons an alert webhook payload was rejected.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("alert is not a json object")]
    NotAnObject,
    #[error("unsupported alert version: {0}")]
    Version(String),
    #[error("alert is missing required field \"{0}\"")]
    Missing(&'static str),
    #[error("alert field \"{0}\" is not a string")]
    NotAString(&'static str),
}

/// Check status notification sent by InfluxDB via an HTTP notification endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub check_name: String,
    pub level: String,
    pub check_type: String,
    pub dead: Option<Value>,
    pub time: Option<Value>,
    pub message: Option<Value>,
    pub extra: BTreeMap<String, Value>,
}

impl Alert {
    /// Parse a version 1 alert, removing InfluxDB metadata fields.
    pub fn parse(payload: &[u8]) -> Result<Self, AlertError> {
        let value: Value = serde_json::from_slice(payload)?;
        let mut obj = match value {
            Value::Object(m) => m,
            _ => return Err(AlertError::NotAnObject),
        };

        match obj.get("_version") {
            None => return Err(AlertError::Missing("_version")),
            Some(v) if v.as_u64() == Some(SUPPORTED_VERSION) => {}
            Some(v) => return Err(AlertError::Version(v.to_string())),
        }

        for field in METADATA_FIELDS {
            obj.remove(*field);
        }

        let check_name = take_string(&mut obj, "_check_name")?;
        let level = take_string(&mut obj, "_level")?;
        let check_type = take_string(&mut obj, "_type")?;

        let dead = if check_type == DEADMAN_TYPE {
            Some(obj.remove("dead").ok_or(AlertError::Missing("dead"))?)
        } else {
            None
        };

        let time = obj.remove("_time");
        let message = obj.remove("_message");
        let extra = obj
            .into_iter()
            .filter(|(k, _)| !k.is_empty() && !k.starts_with('_'))
            .collect();

        Ok(Alert {
            check_name,
            level,
            check_type,
            dead,
            time,
            message,
            extra,
        })
    }

    /// Turn this alert into a human readable notification.
    pub fn render(&self) -> Notification {
        let title = format!("Alert for check: \"{}\"", self.check_name);
        let mut body = String::new();

        // Writing to a String can't fail
        let _ = writeln!(body, "Status: {}", self.level);
        let _ = writeln!(body, "Check type: {}", self.check_type);

        match &self.dead {
            Some(dead) => {
                let _ = writeln!(body, "Dead: {}", display_value(dead));
                let _ = writeln!(body, "Last data point returned by check query:");
            }
            None => {
                let _ = writeln!(body, "Data point (or aggregate) returned by check query:");
            }
        }

        if let Some(time) = &self.time {
            let _ = writeln!(body, "  - Time: {}", display_value(time));
        }

        for (k, v) in self.extra.iter() {
            let _ = writeln!(body, "  - {}: {}", k, display_value(v));
        }

        if let Some(message) = &self.message {
            let _ = writeln!(body, "Custom message:");
            let _ = writeln!(body, "{}", display_value(message));
        }

        Notification::new(title, body, &[DEFAULT_TAG])
    }
}

fn take_string(obj: &mut Map<String, Value>, field: &'static str) -> Result<String, AlertError> {
    match obj.remove(field) {
        None => Err(AlertError::Missing(field)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(AlertError::NotAString(field)),
    }
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
