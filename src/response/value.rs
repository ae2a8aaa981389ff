//! Column definitions and decoded column values.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Declared type of a result column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Boolean
    Bool,
    /// 8-bit signed integer
    Int8,
    /// 8-bit unsigned integer
    UInt8,
    /// 16-bit signed integer
    Int16,
    /// 16-bit unsigned integer
    UInt16,
    /// 32-bit signed integer
    Int32,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit unsigned integer
    UInt64,
    /// Double precision float
    Float,
    /// Single precision float
    Float32,
    /// Unix epoch seconds, decoded to a UTC timestamp
    Time,
    /// Text up to 4 KiB
    ShortText,
    /// Text up to 64 KiB
    Text,
    /// Text up to 2 GiB
    LongText,
    /// Geo point in the Tokyo datum
    TokyoGeoPoint,
    /// Geo point in WGS 84
    WGS84GeoPoint,
    /// Arbitrary JSON, kept as-is
    Object,
}

impl ColumnType {
    /// Look up a type by the name the server reports
    pub fn from_name(name: &str) -> Option<Self> {
        let column_type = match name {
            "Bool" => ColumnType::Bool,
            "Int8" => ColumnType::Int8,
            "UInt8" => ColumnType::UInt8,
            "Int16" => ColumnType::Int16,
            "UInt16" => ColumnType::UInt16,
            "Int32" => ColumnType::Int32,
            "UInt32" => ColumnType::UInt32,
            "Int64" => ColumnType::Int64,
            "UInt64" => ColumnType::UInt64,
            "Float" => ColumnType::Float,
            "Float32" => ColumnType::Float32,
            "Time" => ColumnType::Time,
            "ShortText" => ColumnType::ShortText,
            "Text" => ColumnType::Text,
            "LongText" => ColumnType::LongText,
            "TokyoGeoPoint" => ColumnType::TokyoGeoPoint,
            "WGS84GeoPoint" => ColumnType::WGS84GeoPoint,
            "Object" => ColumnType::Object,
            _ => return None,
        };
        Some(column_type)
    }

    /// Name the server uses for this type
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Bool => "Bool",
            ColumnType::Int8 => "Int8",
            ColumnType::UInt8 => "UInt8",
            ColumnType::Int16 => "Int16",
            ColumnType::UInt16 => "UInt16",
            ColumnType::Int32 => "Int32",
            ColumnType::UInt32 => "UInt32",
            ColumnType::Int64 => "Int64",
            ColumnType::UInt64 => "UInt64",
            ColumnType::Float => "Float",
            ColumnType::Float32 => "Float32",
            ColumnType::Time => "Time",
            ColumnType::ShortText => "ShortText",
            ColumnType::Text => "Text",
            ColumnType::LongText => "LongText",
            ColumnType::TokyoGeoPoint => "TokyoGeoPoint",
            ColumnType::WGS84GeoPoint => "WGS84GeoPoint",
            ColumnType::Object => "Object",
        }
    }

    fn signed_range(&self) -> Option<(i64, i64)> {
        match self {
            ColumnType::Int8 => Some((i8::MIN.into(), i8::MAX.into())),
            ColumnType::Int16 => Some((i16::MIN.into(), i16::MAX.into())),
            ColumnType::Int32 => Some((i32::MIN.into(), i32::MAX.into())),
            ColumnType::Int64 => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    fn unsigned_max(&self) -> Option<u64> {
        match self {
            ColumnType::UInt8 => Some(u8::MAX.into()),
            ColumnType::UInt16 => Some(u16::MAX.into()),
            ColumnType::UInt32 => Some(u32::MAX.into()),
            ColumnType::UInt64 => Some(u64::MAX),
            _ => None,
        }
    }

    /// Coerce a raw JSON cell into a typed value.
    ///
    /// Arrays are vector columns and are coerced element by element.
    /// Returns a description of the mismatch on failure.
    pub fn coerce(&self, raw: &JsonValue) -> Result<Value, String> {
        if *self == ColumnType::Object {
            return Ok(Value::Object(raw.clone()));
        }
        if let JsonValue::Array(elements) = raw {
            return elements
                .iter()
                .map(|element| self.coerce(element))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Vector);
        }

        let mismatch = || format!("expected {} value, got {}", self.name(), raw);
        match self {
            ColumnType::Bool => raw.as_bool().map(Value::Bool).ok_or_else(mismatch),
            ColumnType::Int8 | ColumnType::Int16 | ColumnType::Int32 | ColumnType::Int64 => {
                let (min, max) = self.signed_range().ok_or_else(mismatch)?;
                match raw.as_i64() {
                    Some(n) if n >= min && n <= max => Ok(Value::Int(n)),
                    _ => Err(mismatch()),
                }
            }
            ColumnType::UInt8 | ColumnType::UInt16 | ColumnType::UInt32 | ColumnType::UInt64 => {
                let max = self.unsigned_max().ok_or_else(mismatch)?;
                match raw.as_u64() {
                    Some(n) if n <= max => Ok(Value::UInt(n)),
                    _ => Err(mismatch()),
                }
            }
            ColumnType::Float | ColumnType::Float32 => {
                raw.as_f64().map(Value::Float).ok_or_else(mismatch)
            }
            ColumnType::Time => {
                let seconds = raw.as_f64().ok_or_else(mismatch)?;
                time_from_epoch(seconds)
                    .map(Value::Time)
                    .ok_or_else(|| format!("Time value out of range: {}", raw))
            }
            ColumnType::ShortText | ColumnType::Text | ColumnType::LongText => raw
                .as_str()
                .map(|s| Value::Text(s.to_string()))
                .ok_or_else(mismatch),
            ColumnType::TokyoGeoPoint | ColumnType::WGS84GeoPoint => raw
                .as_str()
                .map(|s| Value::GeoPoint(s.to_string()))
                .ok_or_else(mismatch),
            ColumnType::Object => Ok(Value::Object(raw.clone())),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Convert fractional epoch seconds to a UTC timestamp, microsecond precision
pub fn time_from_epoch(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let micros = (seconds * 1_000_000.0).round() as i64;
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// A result column: name and declared type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name, e.g. `_key`
    pub name: String,
    /// Declared type
    pub column_type: ColumnType,
}

impl Column {
    /// Create a column definition
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A decoded cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean column
    Bool(bool),
    /// Signed integer column
    Int(i64),
    /// Unsigned integer column
    UInt(u64),
    /// Floating point column
    Float(f64),
    /// Text column
    Text(String),
    /// Time column
    Time(DateTime<Utc>),
    /// Geo point in the server's `latitudexlongitude` text form
    GeoPoint(String),
    /// Vector column
    Vector(Vec<Value>),
    /// Object column, kept as JSON
    Object(JsonValue),
}

impl Value {
    /// Get as a string slice, for text and geo point values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::GeoPoint(s) => Some(s),
            _ => None,
        }
    }

    /// Get as i64, for integer values that fit
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::UInt(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Get as a timestamp
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(time) => Some(*time),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::UInt(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) | Value::GeoPoint(s) => f.write_str(s),
            Value::Time(time) => write!(f, "{}", time.to_rfc3339()),
            Value::Vector(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str("]")
            }
            Value::Object(json) => write!(f, "{}", json),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::UInt(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(time: DateTime<Utc>) -> Self {
        Value::Time(time)
    }
}

/// One result row: column name to value, in column order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Value of the named column
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Iterate over `(column, value)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no columns
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
