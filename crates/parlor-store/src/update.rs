//! Atomic field mutations and the store clock.
//!
//! Array operations have set semantics so that concurrent writers converge:
//! a union never duplicates an element and a remove of an absent element is a
//! no-op.

use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};
use crate::subscription::lock;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Replace the value at `path`, creating intermediate objects.
    Set { path: String, value: Value },
    /// Append each value not already present in the array at `path`.
    ArrayUnion { path: String, values: Vec<Value> },
    /// Remove every occurrence of each value from the array at `path`.
    ArrayRemove { path: String, values: Vec<Value> },
    /// Write the store's current timestamp at `path`.
    ServerTimestamp { path: String },
}

impl FieldUpdate {
    pub fn set(path: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldUpdate::Set {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn array_union(path: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldUpdate::ArrayUnion {
            path: path.into(),
            values: vec![value.into()],
        }
    }

    pub fn array_remove(path: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldUpdate::ArrayRemove {
            path: path.into(),
            values: vec![value.into()],
        }
    }

    pub fn server_timestamp(path: impl Into<String>) -> Self {
        FieldUpdate::ServerTimestamp { path: path.into() }
    }

    pub fn path(&self) -> &str {
        match self {
            FieldUpdate::Set { path, .. }
            | FieldUpdate::ArrayUnion { path, .. }
            | FieldUpdate::ArrayRemove { path, .. }
            | FieldUpdate::ServerTimestamp { path } => path,
        }
    }
}

/// Apply `updates` in order to the object `fields`. `now` is the value used for
/// every `ServerTimestamp` in the batch.
pub(crate) fn apply_updates(fields: &mut Value, updates: &[FieldUpdate], now: &str) -> Result<()> {
    for update in updates {
        match update {
            FieldUpdate::Set { path, value } => {
                *slot(fields, path)? = value.clone();
            }
            FieldUpdate::ServerTimestamp { path } => {
                *slot(fields, path)? = Value::String(now.to_string());
            }
            FieldUpdate::ArrayUnion { path, values } => {
                let items = array_slot(fields, path)?;
                for value in values {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
            }
            FieldUpdate::ArrayRemove { path, values } => {
                let items = array_slot(fields, path)?;
                items.retain(|item| !values.contains(item));
            }
        }
    }
    Ok(())
}

/// Mutable slot at a dotted path. Missing or non-object intermediates are
/// replaced with empty objects.
fn slot<'a>(fields: &'a mut Value, path: &str) -> Result<&'a mut Value> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(StoreError::InvalidUpdate(format!("bad field path {path:?}")));
    }

    let mut current = fields;
    for segment in path.split('.') {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = current
            .as_object_mut()
            .map(|map| map.entry(segment.to_string()).or_insert(Value::Null))
            .ok_or_else(|| StoreError::InvalidUpdate(format!("bad field path {path:?}")))?;
    }
    Ok(current)
}

fn array_slot<'a>(fields: &'a mut Value, path: &str) -> Result<&'a mut Vec<Value>> {
    let target = slot(fields, path)?;
    if target.is_null() {
        *target = Value::Array(Vec::new());
    }
    match target {
        Value::Array(items) => Ok(items),
        other => Err(StoreError::InvalidUpdate(format!(
            "{path} is not an array (found {other})"
        ))),
    }
}

/// Issues strictly increasing timestamps, even when the wall clock stalls or
/// steps backwards. Rendered with fixed nanosecond precision so the string
/// form sorts chronologically.
#[derive(Debug)]
pub(crate) struct ServerClock {
    last: Mutex<DateTime<Utc>>,
}

impl ServerClock {
    pub(crate) fn new() -> Self {
        Self {
            last: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub(crate) fn now(&self) -> String {
        let mut last = lock(&self.last);
        let wall = Utc::now();
        let next = if wall > *last {
            wall
        } else {
            *last + Duration::nanoseconds(1)
        };
        *last = next;
        next.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new()
    }
}
