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

use crate::queue::InboundMessage;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::{self, Write};

pub const DEFAULT_BUCKET: &str = "default";

/// Value of a single field of a metric point.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    UInteger(u64),
    Boolean(bool),
    String(String),
}

impl FieldValue {
    fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Bool(b) => Some(FieldValue::Boolean(*b)),
            Value::String(s) => Some(FieldValue::String(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(FieldValue::Integer(i))
                } else if let Some(u) = n.as_u64() {
                    Some(FieldValue::UInteger(u))
                } else {
                    n.as_f64().map(FieldValue::Float)
                }
            }
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}i", v),
            FieldValue::UInteger(v) => write!(f, "{}u", v),
            FieldValue::Boolean(v) => write!(f, "{}", v),
            FieldValue::String(v) => {
                f.write_char('"')?;
                for c in v.chars() {
                    if c == '"' || c == '\\' {
                        f.write_char('\\')?;
                    }
                    f.write_char(c)?;
                }
                f.write_char('"')
            }
        }
    }
}

/// Reasons an inbound message can't be turned into a `MetricPoint`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("message is not valid json: {0}")]
    Json(String),
    #[error("message is not a json object")]
    NotAnObject,
    #[error("field \"measurement\" {0}")]
    Measurement(&'static str),
    #[error("field \"tags\" {0}")]
    Tags(String),
    #[error("field \"fields\" {0}")]
    Fields(String),
    #[error("field \"time\" {0}")]
    Time(&'static str),
    #[error("field \"bucket\" {0}")]
    Bucket(&'static str),
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::Json(_) => "json",
            ValidationError::NotAnObject => "not_object",
            ValidationError::Measurement(_) => "measurement",
            ValidationError::Tags(_) => "tags",
            ValidationError::Fields(_) => "fields",
            ValidationError::Time(_) => "time",
            ValidationError::Bucket(_) => "bucket",
        }
    }
}

/// A validated measurement ready to be written to a bucket.
///
/// Only ever built by decoding an `InboundMessage` that passed validation. Tags and
/// fields are kept sorted so that the rendered line protocol is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub time: i64,
    pub bucket: String,
}

impl MetricPoint {
    /// Parse and validate the payload of a message. An explicit `time` in the payload
    /// takes precedence over the time the message was received.
    ///
    /// Expected shape (`tags`, `time`, and `bucket` are optional):
    ///
    /// ```text
    /// {
    ///     "measurement": "water_depth",
    ///     "tags": {"location": "some_canal"},
    ///     "fields": {"depth_in_meters": 1},
    ///     "time": "1700000000000000000",
    ///     "bucket": "rivers"
    /// }
    /// ```
    pub fn decode(msg: &InboundMessage) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(&msg.payload).map_err(|e| ValidationError::Json(e.to_string()))?;
        let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;

        let measurement = match obj.get("measurement") {
            None => return Err(ValidationError::Measurement("is missing")),
            Some(Value::String(s)) if s.is_empty() => return Err(ValidationError::Measurement("is empty")),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(ValidationError::Measurement("is not a string")),
        };

        let tags = match obj.get("tags") {
            None => BTreeMap::new(),
            Some(Value::Object(m)) => decode_tags(m)?,
            Some(_) => return Err(ValidationError::Tags("is not an object".to_owned())),
        };

        let fields = match obj.get("fields") {
            None => return Err(ValidationError::Fields("is missing".to_owned())),
            Some(Value::Object(m)) => decode_fields(m)?,
            Some(_) => return Err(ValidationError::Fields("is not an object".to_owned())),
        };

        let time = match obj.get("time") {
            None => msg.received_at,
            Some(Value::String(s)) => s
                .parse::<i64>()
                .map_err(|_| ValidationError::Time("is not a nanosecond unix timestamp"))?,
            Some(_) => return Err(ValidationError::Time("is not a string")),
        };

        let bucket = match obj.get("bucket") {
            None => DEFAULT_BUCKET.to_owned(),
            Some(Value::String(s)) if s.is_empty() => return Err(ValidationError::Bucket("is empty")),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(ValidationError::Bucket("is not a string")),
        };

        Ok(MetricPoint {
            measurement,
            tags,
            fields,
            time,
            bucket,
        })
    }

    /// Render this point in the InfluxDB line protocol with nanosecond precision.
    pub fn to_line_protocol(&self) -> String {
        let mut out = String::new();
        escape_into(&mut out, &self.measurement, &[',', ' ']);

        for (k, v) in self.tags.iter().filter(|(k, v)| !k.is_empty() && !v.is_empty()) {
            out.push(',');
            escape_into(&mut out, k, &[',', '=', ' ']);
            out.push('=');
            escape_into(&mut out, v, &[',', '=', ' ']);
        }

        out.push(' ');
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            escape_into(&mut out, k, &[',', '=', ' ']);
            out.push('=');
            // Writing to a String can't fail
            let _ = write!(out, "{}", v);
        }

        let _ = write!(out, " {}", self.time);
        out
    }
}

/// Tags with an empty key or value can't be written so they are left out.
fn decode_tags(m: &Map<String, Value>) -> Result<BTreeMap<String, String>, ValidationError> {
    let mut tags = BTreeMap::new();
    for (k, v) in m.iter() {
        match v {
            Value::String(s) if k.is_empty() || s.is_empty() => {}
            Value::String(s) => {
                tags.insert(k.clone(), s.clone());
            }
            other => {
                return Err(ValidationError::Tags(format!(
                    "has an entry with a non-string value: \"{}: {}\"",
                    k, other
                )))
            }
        }
    }

    Ok(tags)
}

fn decode_fields(m: &Map<String, Value>) -> Result<BTreeMap<String, FieldValue>, ValidationError> {
    if m.is_empty() {
        return Err(ValidationError::Fields("is empty".to_owned()));
    }

    let mut fields = BTreeMap::new();
    for (k, v) in m.iter() {
        if k.is_empty() {
            return Err(ValidationError::Fields("has an entry with an empty key".to_owned()));
        }

        let value = FieldValue::from_json(v).ok_or_else(|| {
            ValidationError::Fields(format!("has an entry with an unsupported value: \"{}: {}\"", k, v))
        })?;

        fields.insert(k.clone(), value);
    }

    Ok(fields)
}

/// Escape a measurement, tag, or field key name. Line breaks and tabs would end the
/// line or the element early so they're written as escape sequences.
fn escape_into(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == '\\' || special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}
