//! Sink-ready measurement points and their line-protocol encoding.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

/// Static tag set attached to every point (host identity and configured tags).
pub type StaticTags = BTreeMap<String, String>;

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit float.
    Float(f64),
    /// Signed integer.
    Integer(i64),
    /// Unsigned integer.
    UInteger(u64),
    /// Boolean.
    Boolean(bool),
    /// UTF-8 string.
    String(String),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        Self::UInteger(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        Self::UInteger(u64::from(v))
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// One timestamped measurement with tags and fields.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    /// Measurement name.
    pub measurement: String,
    /// Indexed tags.
    pub tags: BTreeMap<String, String>,
    /// Field values.
    pub fields: BTreeMap<String, FieldValue>,
    /// Epoch milliseconds.
    pub timestamp_ms: i64,
}

impl MetricPoint {
    /// Start a point for `measurement` at `at`.
    pub fn new(measurement: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp_ms: at.timestamp_millis(),
        }
    }

    /// Add every tag in `tags`.
    pub fn with_tags(mut self, tags: &StaticTags) -> Self {
        self.tags.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Add one tag. Empty values are not representable and are skipped.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.tags.insert(key.into(), value);
        }
        self
    }

    /// Add one field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Add a field only if the value was reported.
    pub fn with_opt_field<V: Into<FieldValue>>(
        self,
        key: impl Into<String>,
        value: Option<V>,
    ) -> Self {
        match value {
            Some(v) => self.with_field(key, v),
            None => self,
        }
    }

    /// Encode as one line of InfluxDB line protocol.
    ///
    /// Returns `None` when no encodable field remains (non-finite floats are
    /// dropped, as line protocol cannot represent them).
    pub fn to_line_protocol(&self) -> Option<String> {
        let mut fields = String::new();
        for (key, value) in &self.fields {
            let encoded = match value {
                FieldValue::Float(v) if !v.is_finite() => continue,
                FieldValue::Float(v) => format!("{v}"),
                FieldValue::Integer(v) => format!("{v}i"),
                FieldValue::UInteger(v) => format!("{v}u"),
                FieldValue::Boolean(v) => v.to_string(),
                FieldValue::String(v) => format!("\"{}\"", escape_string_field(v)),
            };
            if !fields.is_empty() {
                fields.push(',');
            }
            let _ = write!(fields, "{}={}", escape_key(key), encoded);
        }
        if fields.is_empty() {
            return None;
        }

        let mut line = escape_measurement(&self.measurement);
        for (key, value) in &self.tags {
            let _ = write!(line, ",{}={}", escape_key(key), escape_key(value));
        }
        let _ = write!(line, " {} {}", fields, self.timestamp_ms);
        Some(line)
    }
}

fn escape_measurement(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, ',' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape tag keys, tag values and field keys.
fn escape_key(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            ',' | '=' | ' ' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_string_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
