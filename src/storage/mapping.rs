//! Value type mapping and parameter binding.
//!
//! | value          | column type               |
//! |----------------|---------------------------|
//! | `Text`         | configured text type      |
//! | `Timestamp`    | `TIMESTAMP`               |
//! | `Bool`         | `BOOLEAN`                 |
//! | `Int64`        | `BIGINT`                  |
//! | `Int32`        | `INTEGER`                 |
//! | `Int16`        | `SMALLINT`                |
//! | `Float64/32`   | configured float type     |
//! | `OtherNumeric` | `NUMERIC(38, 0)`          |
//! | `Unsupported`  | none, the sample is dropped |

use chrono::{DateTime, Utc};
use duckdb::types::{TimeUnit, Value};

use crate::storage::StorageError;
use crate::storage::types::{ColumnType, SampleValue};

/// Default column type for text values.
pub const DEFAULT_TEXT_TYPE: &str = "VARCHAR";

/// Default column type for floating point values.
pub const DEFAULT_FLOAT_TYPE: &str = "REAL";

/// Maps sample values to column types and bindable parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapper {
    text_type: String,
    float_type: String,
}

impl Default for TypeMapper {
    fn default() -> Self {
        Self {
            text_type: DEFAULT_TEXT_TYPE.to_string(),
            float_type: DEFAULT_FLOAT_TYPE.to_string(),
        }
    }
}

impl TypeMapper {
    /// Create a mapper with store-specific text and float type names.
    ///
    /// Type names end up verbatim in DDL, so they are restricted to a word
    /// list with an optional numeric parameter suffix (e.g. `VARCHAR(256)`,
    /// `DECIMAL(18, 3)`, `DOUBLE PRECISION`).
    pub fn new(
        text_type: impl Into<String>,
        float_type: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let text_type = validate_type_name(text_type.into())?;
        let float_type = validate_type_name(float_type.into())?;
        Ok(Self {
            text_type,
            float_type,
        })
    }

    pub fn text_type(&self) -> &str {
        &self.text_type
    }

    pub fn float_type(&self) -> &str {
        &self.float_type
    }

    /// Column type for a value, or `None` if the value has no mapping.
    pub fn column_type(&self, value: &SampleValue) -> Option<ColumnType> {
        let column_type = match value {
            SampleValue::Text(_) => ColumnType::Text(self.text_type.clone()),
            SampleValue::Timestamp(_) => ColumnType::Timestamp,
            SampleValue::Bool(_) => ColumnType::Boolean,
            SampleValue::Int64(_) => ColumnType::BigInt,
            SampleValue::Int32(_) => ColumnType::Integer,
            SampleValue::Int16(_) => ColumnType::SmallInt,
            SampleValue::Float64(_) | SampleValue::Float32(_) => {
                ColumnType::Float(self.float_type.clone())
            }
            SampleValue::OtherNumeric(_) => ColumnType::Numeric,
            SampleValue::Unsupported { .. } => return None,
        };
        Some(column_type)
    }

    /// Like [`column_type`](Self::column_type), naming the column on failure.
    pub fn require_column_type(
        &self,
        column: &str,
        value: &SampleValue,
    ) -> Result<ColumnType, StorageError> {
        self.column_type(value)
            .ok_or_else(|| unsupported(column, value))
    }
}

/// Convert a sample value into a duckdb parameter.
pub fn bind_value(column: &str, value: &SampleValue) -> Result<Value, StorageError> {
    let bound = match value {
        SampleValue::Text(s) => Value::Text(s.clone()),
        SampleValue::Timestamp(ts) => bind_timestamp(*ts),
        SampleValue::Bool(b) => Value::Boolean(*b),
        SampleValue::Int16(v) => Value::SmallInt(*v),
        SampleValue::Int32(v) => Value::Int(*v),
        SampleValue::Int64(v) => Value::BigInt(*v),
        SampleValue::Float32(v) => Value::Float(*v),
        SampleValue::Float64(v) => Value::Double(*v),
        SampleValue::OtherNumeric(v) => Value::HugeInt(*v),
        SampleValue::Unsupported { .. } => return Err(unsupported(column, value)),
    };
    Ok(bound)
}

/// Timestamps are bound with microsecond precision.
pub fn bind_timestamp(ts: DateTime<Utc>) -> Value {
    Value::Timestamp(TimeUnit::Microsecond, ts.timestamp_micros())
}

fn unsupported(column: &str, value: &SampleValue) -> StorageError {
    StorageError::UnsupportedValue {
        column: column.to_string(),
        type_name: value.type_name().to_string(),
    }
}

/// Whether `name` can be spliced into DDL as a column type.
///
/// Commas are only allowed inside a single trailing `(p[, s])` suffix.
pub fn is_valid_type_name(name: &str) -> bool {
    static TYPE_NAME_REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let regex = TYPE_NAME_REGEX.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z][A-Za-z0-9_ ]*(\(\s*\d+\s*(,\s*\d+\s*)?\))?$")
            .expect("failed to compile type name regex")
    });
    regex.is_match(name.trim())
}

fn validate_type_name(name: String) -> Result<String, StorageError> {
    if is_valid_type_name(&name) {
        Ok(name.trim().to_string())
    } else {
        Err(StorageError::InvalidIdentifier(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_column_type_table() {
        let mapper = TypeMapper::default();
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let cases = [
            (SampleValue::from("text"), "VARCHAR"),
            (SampleValue::from(ts), "TIMESTAMP"),
            (SampleValue::from(true), "BOOLEAN"),
            (SampleValue::from(1_i64), "BIGINT"),
            (SampleValue::from(1_i32), "INTEGER"),
            (SampleValue::from(1_i16), "SMALLINT"),
            (SampleValue::from(1.0_f64), "REAL"),
            (SampleValue::from(1.0_f32), "REAL"),
            (SampleValue::from(1_u64), "NUMERIC(38, 0)"),
            (SampleValue::from(1_u8), "NUMERIC(38, 0)"),
        ];
        for (value, expected) in cases {
            let column_type = mapper.column_type(&value).unwrap();
            assert_eq!(column_type.as_sql(), expected, "value {value:?}");
        }
    }

    #[test]
    fn test_unsupported_has_no_column_type() {
        let mapper = TypeMapper::default();
        let value = SampleValue::unsupported::<Vec<String>>();
        assert!(mapper.column_type(&value).is_none());

        let err = mapper.require_column_type("VALUE", &value).unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedValue { .. }));
        assert!(err.to_string().contains("VALUE"));
    }

    #[test]
    fn test_configured_type_names() {
        let mapper = TypeMapper::new("VARCHAR(256)", "DOUBLE").unwrap();
        assert_eq!(
            mapper.column_type(&SampleValue::from("x")),
            Some(ColumnType::Text("VARCHAR(256)".to_string()))
        );
        assert_eq!(
            mapper.column_type(&SampleValue::from(2.5_f64)),
            Some(ColumnType::Float("DOUBLE".to_string()))
        );
    }

    #[test]
    fn test_type_name_validation() {
        assert!(is_valid_type_name("DECIMAL(18, 3)"));
        assert!(is_valid_type_name("VARCHAR(256)"));
        assert!(is_valid_type_name("DOUBLE PRECISION"));
        assert!(is_valid_type_name(" REAL "));

        // A comma outside the suffix would add a column to CREATE TABLE
        assert!(!is_valid_type_name("VARCHAR, x INTEGER"));
        assert!(!is_valid_type_name("VARCHAR(10), x INTEGER"));
        assert!(!is_valid_type_name("DECIMAL(18, 3)(4)"));
        assert!(!is_valid_type_name("VARCHAR(n)"));
        assert!(!is_valid_type_name("(10)"));
        assert!(TypeMapper::new("VARCHAR, zone VARCHAR", "REAL").is_err());
        assert!(TypeMapper::new("", "REAL").is_err());
        assert!(TypeMapper::new("TEXT; DROP TABLE x", "REAL").is_err());
        assert!(TypeMapper::new("VARCHAR", "REAL\"").is_err());
    }

    #[test]
    fn test_bind_value() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap();
        assert_eq!(
            bind_value("t", &SampleValue::from(ts)).unwrap(),
            Value::Timestamp(TimeUnit::Microsecond, 1_704_067_201_000_000)
        );
        assert_eq!(
            bind_value("v", &SampleValue::from(7_i16)).unwrap(),
            Value::SmallInt(7)
        );
        assert_eq!(
            bind_value("v", &SampleValue::from(3_u32)).unwrap(),
            Value::HugeInt(3)
        );
        assert!(bind_value("v", &SampleValue::unsupported::<()>()).is_err());
    }
}
