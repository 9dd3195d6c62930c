//! Conversion between the application's value model and SQLite storage.
//!
//! The application sees booleans and JSON documents; SQLite stores 0/1
//! integers and text. [`to_logical`] runs on every row read back from the
//! engine, [`to_storage`] on every record written to it.

use chrono::{SecondsFormat, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Map, Number, Value};
use tracing::trace;

use crate::schema::SchemaCatalog;

/// A flat column → value mapping, as exchanged with the application.
pub type Row = Map<String, Value>;

/// Converts a stored row into its logical form.
///
/// Boolean columns become `true` only for `1` or `true`; any other value in a
/// declared boolean column becomes `false`. Document columns holding text are
/// parsed, keeping the raw text when it is not JSON.
pub fn to_logical(catalog: &SchemaCatalog, table: &str, mut row: Row) -> Row {
    let meta = catalog.table(table);

    for column in meta.boolean_columns {
        if let Some(value) = row.get_mut(*column) {
            let truthy = matches!(value, Value::Bool(true)) || value.as_i64() == Some(1);
            *value = Value::Bool(truthy);
        }
    }

    for column in meta.document_columns {
        let parsed = match row.get(*column) {
            Some(Value::String(text)) => parse_document(text),
            _ => continue,
        };
        match parsed {
            Ok(value) => {
                row.insert((*column).to_string(), value);
            }
            Err(e) => {
                trace!(table, column = *column, error = %e, "keeping non-JSON document text");
            }
        }
    }

    row
}

/// Converts a logical record into its storage form.
///
/// Booleans in declared boolean columns become `1`/`0`. Objects and arrays in
/// document columns are serialized to text; any other value (including text
/// that is already serialized) is written as-is.
pub fn to_storage(catalog: &SchemaCatalog, table: &str, mut data: Row) -> Row {
    let meta = catalog.table(table);

    for column in meta.boolean_columns {
        if let Some(Value::Bool(b)) = data.get(*column) {
            let stored = Value::from(i64::from(*b));
            data.insert((*column).to_string(), stored);
        }
    }

    for column in meta.document_columns {
        if let Some(value) = data.get_mut(*column) {
            if value.is_object() || value.is_array() {
                *value = Value::String(value.to_string());
            }
        }
    }

    data
}

/// Storage form of a single filter value compared against `column`.
///
/// Only boolean coercion applies here; documents are never filtered on.
pub fn filter_value(catalog: &SchemaCatalog, table: &str, column: &str, value: &Value) -> Value {
    match value {
        Value::Bool(b) if catalog.is_boolean(table, column) => Value::from(i64::from(*b)),
        other => other.clone(),
    }
}

/// Parses document text. Callers decide what to do with text that is not JSON.
pub fn parse_document(text: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(text)
}

/// A fresh random identifier (UUID v4, hyphenated).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current UTC time as ISO-8601 with millisecond precision, e.g.
/// `2026-03-01T09:30:00.000Z`.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Converts a JSON value into a value SQLite can bind.
///
/// Booleans outside declared columns still have to become integers, and any
/// nested structure that reaches this point is bound as its JSON text.
pub fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Text(n.to_string())
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Converts one SQLite cell into JSON.
///
/// BLOBs come back in the hosted backend's `bytea` hex form, `\x` followed by
/// two lowercase hex digits per byte.
pub fn from_sql(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Number(n.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("\\x{}", hex::encode(b))),
    }
}
