//! REST-facing data types: tenant, records, pages and rate limits.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{LedgerError, Result};

/// HTTP verbs used against the provider's REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tenant identifier scoping every resource URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Division(String);

impl Division {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read a division from a JSON value; the provider returns it as a
    /// number, configuration usually as a string.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self(n.to_string())),
            Value::String(s) if !s.trim().is_empty() => Some(Self(s.trim().to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for Division {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Opaque server-provided continuation URL (`d.__next`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a listing plus the cursor for the next page, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next: Option<Cursor>) -> Self {
        Self { items, next }
    }

    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page { items: self.items.into_iter().map(f).collect(), next: self.next }
    }
}

/// Named fields of a single REST entity.
///
/// Plain data: field names follow the provider's casing and values stay JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRecord {
    fields: Map<String, Value>,
}

impl EntityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Protocol`] for anything other than an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(LedgerError::Protocol(format!(
                "Expected an entity object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Rate-limit counters reported by the provider on each response.
///
/// Daily counters come from `X-RateLimit-*`, per-minute counters from
/// `X-RateLimit-Minutely-*`. Absent or unparsable headers stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    /// Epoch milliseconds at which the daily window resets
    pub reset: Option<u64>,
    pub minutely_limit: Option<u64>,
    pub minutely_remaining: Option<u64>,
    pub minutely_reset: Option<u64>,
}

impl RateLimits {
    pub const LIMIT_HEADER: &'static str = "X-RateLimit-Limit";
    pub const REMAINING_HEADER: &'static str = "X-RateLimit-Remaining";
    pub const RESET_HEADER: &'static str = "X-RateLimit-Reset";
    pub const MINUTELY_LIMIT_HEADER: &'static str = "X-RateLimit-Minutely-Limit";
    pub const MINUTELY_REMAINING_HEADER: &'static str = "X-RateLimit-Minutely-Remaining";
    pub const MINUTELY_RESET_HEADER: &'static str = "X-RateLimit-Minutely-Reset";

    /// Build from a header lookup function.
    pub fn from_headers<'a>(lookup: impl Fn(&str) -> Option<&'a str>) -> Self {
        let read = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());
        Self {
            limit: read(Self::LIMIT_HEADER),
            remaining: read(Self::REMAINING_HEADER),
            reset: read(Self::RESET_HEADER),
            minutely_limit: read(Self::MINUTELY_LIMIT_HEADER),
            minutely_remaining: read(Self::MINUTELY_REMAINING_HEADER),
            minutely_reset: read(Self::MINUTELY_RESET_HEADER),
        }
    }

    /// True when no counter was reported.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
