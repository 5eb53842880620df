//! Core data types for the storage layer.
//!
//! - [`SampleValue`]: Closed set of scalar kinds a sample or tag may carry
//! - [`TagSet`]: Ordered, case-insensitively unique tag names
//! - [`MetricSample`]: One `(timestamp, key, tags, value)` observation
//! - [`ColumnType`]: Storage column type derived from a value

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;

// =============================================================================
// Values
// =============================================================================

/// A typed scalar attached to a sample, either as its value or as a tag.
///
/// `Unsupported` carries the name of a runtime type that has no storage
/// mapping. Such values are never written.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Text(String),
    Timestamp(DateTime<Utc>),
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// Any other integral number, stored as `NUMERIC(38, 0)`.
    OtherNumeric(i128),
    Unsupported { type_name: String },
}

impl SampleValue {
    /// Build an unsupported value named after the Rust type `T`.
    pub fn unsupported<T: ?Sized>() -> Self {
        Self::Unsupported {
            type_name: std::any::type_name::<T>().to_string(),
        }
    }

    /// Name of the runtime kind, used in log messages.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::Bool(_) => "bool",
            Self::Int16(_) => "i16",
            Self::Int32(_) => "i32",
            Self::Int64(_) => "i64",
            Self::Float32(_) => "f32",
            Self::Float64(_) => "f64",
            Self::OtherNumeric(_) => "numeric",
            Self::Unsupported { type_name } => type_name,
        }
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::OtherNumeric(v) => write!(f, "{v}"),
            Self::Unsupported { type_name } => write!(f, "<{type_name}>"),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SampleValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    String => Text,
    &str => Text,
    DateTime<Utc> => Timestamp,
    bool => Bool,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    i8 => OtherNumeric,
    u8 => OtherNumeric,
    u16 => OtherNumeric,
    u32 => OtherNumeric,
    u64 => OtherNumeric,
    i128 => OtherNumeric,
}

impl From<usize> for SampleValue {
    fn from(v: usize) -> Self {
        Self::OtherNumeric(v as i128)
    }
}

impl From<isize> for SampleValue {
    fn from(v: isize) -> Self {
        Self::OtherNumeric(v as i128)
    }
}

impl From<serde_json::Value> for SampleValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::String(s) => Self::Text(s),
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int64(i)
                } else if let Some(u) = n.as_u64() {
                    Self::OtherNumeric(i128::from(u))
                } else {
                    n.as_f64().map_or_else(
                        || Self::Unsupported {
                            type_name: "number".to_string(),
                        },
                        Self::Float64,
                    )
                }
            }
            Value::Null => Self::Unsupported {
                type_name: "null".to_string(),
            },
            Value::Array(_) => Self::Unsupported {
                type_name: "array".to_string(),
            },
            Value::Object(_) => Self::Unsupported {
                type_name: "object".to_string(),
            },
        }
    }
}

impl<'de> Deserialize<'de> for SampleValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

// =============================================================================
// Tags
// =============================================================================

/// Ordered tag set.
///
/// Names are unique under ASCII case-insensitive comparison; inserting a name
/// that already exists (in any case) replaces its value in place. Iteration
/// order is insertion order and determines generated column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagSet {
    entries: Vec<(String, SampleValue)>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tag.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SampleValue>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SampleValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SampleValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SampleValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for TagSet
where
    K: Into<String>,
    V: Into<SampleValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Self::new();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

impl<'de> Deserialize<'de> for TagSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagSetVisitor;

        impl<'de> Visitor<'de> for TagSetVisitor {
            type Value = TagSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of tag names to scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<TagSet, A::Error> {
                let mut tags = TagSet::new();
                while let Some((name, value)) = map.next_entry::<String, SampleValue>()? {
                    if tags.contains(&name) {
                        return Err(de::Error::custom(format!("duplicate tag name '{name}'")));
                    }
                    tags.insert(name, value);
                }
                Ok(tags)
            }
        }

        deserializer.deserialize_map(TagSetVisitor)
    }
}

// =============================================================================
// Samples
// =============================================================================

/// One metric observation, consumed once by the reporter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricSample {
    /// Observation time (UTC).
    pub timestamp: DateTime<Utc>,
    /// Metric key, resolved to a table name by a [`TableFilter`](crate::filter::TableFilter).
    pub key: String,
    /// Dimensional labels, one column each.
    #[serde(default)]
    pub tags: TagSet,
    pub value: SampleValue,
}

impl MetricSample {
    pub fn new(
        timestamp: DateTime<Utc>,
        key: impl Into<String>,
        tags: TagSet,
        value: impl Into<SampleValue>,
    ) -> Self {
        Self {
            timestamp,
            key: key.into(),
            tags,
            value: value.into(),
        }
    }
}

// =============================================================================
// Column Types
// =============================================================================

/// Storage column type derived from a [`SampleValue`].
///
/// `Text` and `Float` carry the configured store-specific type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Text(String),
    Timestamp,
    Boolean,
    BigInt,
    Integer,
    SmallInt,
    Float(String),
    Numeric,
}

impl ColumnType {
    /// SQL type name as it appears in DDL.
    pub fn as_sql(&self) -> &str {
        match self {
            Self::Text(name) | Self::Float(name) => name,
            Self::Timestamp => "TIMESTAMP",
            Self::Boolean => "BOOLEAN",
            Self::BigInt => "BIGINT",
            Self::Integer => "INTEGER",
            Self::SmallInt => "SMALLINT",
            Self::Numeric => "NUMERIC(38, 0)",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}
