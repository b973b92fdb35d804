//! Typed field extraction from queue payload documents.
//!
//! Payloads are JSON documents produced by the mobile client. Fields are addressed with a small
//! subset of JSONPath:
//!
//! - `$['obs']['obs.uuid']`: bracketed segments, which may themselves contain dots
//! - `$.obs.items[0]`: dotted segments and numeric array indices
//!
//! Extraction never fails for a missing field. A key that is absent, JSON `null`, or a blank
//! string reads as `None`. Only a field that is present with the wrong type produces a
//! [`PayloadFormatError`].

use crate::constants::OBS_NAMESPACE;
use crate::error::{PathError, PayloadFormatError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use obsq_types::NonEmptyText;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

/// A parsed path into a payload document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Path to `key` inside the `obs` namespace object.
    pub fn obs(key: &str) -> Self {
        Self::new([OBS_NAMESPACE, key])
    }

    /// Parse a path expression such as `$['obs']['obs.uuid']` or `$.obs.value`.
    pub fn parse(expr: &str) -> Result<Self, PathError> {
        let fail = |reason| PathError {
            expr: expr.to_owned(),
            reason,
        };

        let mut rest = expr
            .trim()
            .strip_prefix('$')
            .ok_or_else(|| fail("path must start with '$'"))?;
        let mut segments = Vec::new();

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                let quote = after.chars().next().ok_or_else(|| fail("unterminated '['"))?;
                if quote == '\'' || quote == '"' {
                    let body = &after[1..];
                    let end = body.find(quote).ok_or_else(|| fail("unterminated quote"))?;
                    let tail = body[end + 1..]
                        .strip_prefix(']')
                        .ok_or_else(|| fail("expected ']' after quoted key"))?;
                    segments.push(body[..end].to_owned());
                    rest = tail;
                } else {
                    let end = after.find(']').ok_or_else(|| fail("unterminated '['"))?;
                    let index = after[..end].trim();
                    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
                        return Err(fail("unquoted bracket segment must be an array index"));
                    }
                    segments.push(index.to_owned());
                    rest = &after[end + 1..];
                }
            } else if let Some(after) = rest.strip_prefix('.') {
                let end = after.find(['.', '[']).unwrap_or(after.len());
                if end == 0 {
                    return Err(fail("empty segment"));
                }
                segments.push(after[..end].to_owned());
                rest = &after[end..];
            } else {
                return Err(fail("expected '.' or '[' between segments"));
            }
        }

        if segments.is_empty() {
            return Err(fail("path has no segments"));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Walk the document along this path. Numeric segments index into arrays.
    pub fn lookup<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(document, |node, segment| match node {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.segments {
            write!(f, "['{segment}']")?;
        }
        Ok(())
    }
}

/// A type that can be read out of a payload field.
pub trait PayloadField: Sized {
    /// Human-readable type name used in format errors.
    const EXPECTED: &'static str;

    /// Convert a present, non-null, non-blank JSON value. `None` means the type is wrong.
    fn from_json(value: &Value) -> Option<Self>;
}

impl PayloadField for NonEmptyText {
    const EXPECTED: &'static str = "text";

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => NonEmptyText::non_blank(s),
            Value::Number(n) => NonEmptyText::non_blank(n.to_string()),
            Value::Bool(b) => NonEmptyText::non_blank(b.to_string()),
            _ => None,
        }
    }
}

impl PayloadField for i64 {
    const EXPECTED: &'static str = "an integer";

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl PayloadField for bool {
    const EXPECTED: &'static str = "a boolean";

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Some(true),
            Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }
}

impl PayloadField for DateTime<Utc> {
    const EXPECTED: &'static str = "a date-time";

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => parse_date_time(s),
            Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
            _ => None,
        }
    }
}

/// Read a typed field, treating missing, `null` and blank values as absent.
pub fn extract<T: PayloadField>(
    document: &Value,
    path: &FieldPath,
) -> Result<Option<T>, PayloadFormatError> {
    let value = match path.lookup(document) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(value) => value,
    };

    T::from_json(value)
        .map(Some)
        .ok_or_else(|| PayloadFormatError {
            path: path.to_string(),
            expected: T::EXPECTED,
            found: describe(value),
        })
}

/// Interpret a queue payload as a JSON document.
///
/// Payloads stored as text arrive as a JSON string holding the serialised document.
pub fn document(payload: &Value) -> Result<Cow<'_, Value>, PayloadFormatError> {
    match payload {
        Value::Object(_) => Ok(Cow::Borrowed(payload)),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed @ Value::Object(_)) => Ok(Cow::Owned(parsed)),
            Ok(other) => Err(not_a_document(&other)),
            Err(e) => Err(PayloadFormatError {
                path: "$".into(),
                expected: "a JSON object",
                found: format!("unparseable text ({e})"),
            }),
        },
        other => Err(not_a_document(other)),
    }
}

fn not_a_document(value: &Value) -> PayloadFormatError {
    PayloadFormatError {
        path: "$".into(),
        expected: "a JSON object",
        found: describe(value),
    }
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%dT%H:%M%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse the date-time shapes the mobile client is known to send. Timestamps without an offset
/// are taken as UTC.
pub fn parse_date_time(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let naive = s.strip_suffix(['Z', 'z']).unwrap_or(s);
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("text {s:?}"),
        Value::Array(_) => "an array".into(),
        Value::Object(_) => "an object".into(),
    }
}
