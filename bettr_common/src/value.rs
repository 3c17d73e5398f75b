//! Scalar values, column types and primary-key values

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a table column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
}

impl ColumnType {
    /// SQL type affinity used in generated DDL
    pub fn sql_affinity(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            // SQLite has no boolean storage class
            ColumnType::Boolean => "INTEGER",
        }
    }

    /// Whether values of this type can serve as a primary key
    pub fn is_key_type(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Text)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// A typed scalar cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Convert a JSON scalar. Arrays and objects have no scalar form.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float)),
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// Parse a raw text cell (e.g. from a CSV file) as the given column type.
    ///
    /// Blank cells become `Null`. Cells that don't parse are kept as `Text`
    /// so that validation can report the mismatch with its row index.
    pub fn parse_as(raw: &str, column_type: ColumnType) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }

        let parsed = match column_type {
            ColumnType::Integer => trimmed.parse::<i64>().ok().map(Value::Int).or_else(|| {
                // pandas writes integer columns with missing values as floats ("12.0")
                trimmed
                    .parse::<f64>()
                    .ok()
                    // i64::MAX as f64 rounds up to 2^63, which is out of range
                    .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                    .map(|f| Value::Int(f as i64))
            }),
            ColumnType::Real => trimmed.parse::<f64>().ok().map(Value::Float),
            ColumnType::Boolean => parse_bool(trimmed).map(Value::Bool),
            ColumnType::Text => Some(Value::Text(raw.to_string())),
        };

        parsed.unwrap_or_else(|| Value::Text(raw.to_string()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "real",
            Value::Text(_) => "text",
        }
    }

    /// Primary-key form of this value, if it has one
    pub fn as_key(&self) -> Option<Key> {
        match self {
            Value::Int(i) => Some(Key::Int(*i)),
            Value::Text(s) => Some(Key::Text(s.clone())),
            _ => None,
        }
    }

    /// Check this value against a column type, widening integers for real columns.
    ///
    /// Returns the value as it should be stored, or `None` on a type mismatch.
    /// `Null` passes here; nullability is the caller's concern.
    pub fn conform_to(&self, column_type: ColumnType) -> Option<Value> {
        match (self, column_type) {
            (Value::Null, _) => Some(Value::Null),
            (Value::Int(_), ColumnType::Integer)
            | (Value::Float(_), ColumnType::Real)
            | (Value::Text(_), ColumnType::Text)
            | (Value::Bool(_), ColumnType::Boolean) => Some(self.clone()),
            (Value::Int(i), ColumnType::Real) => Some(Value::Float(*i as f64)),
            _ => None,
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A primary-key value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Text(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{}", i),
            Key::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Text(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_as_handles_blank_cells() {
        assert_eq!(Value::parse_as("", ColumnType::Integer), Value::Null);
        assert_eq!(Value::parse_as("   ", ColumnType::Text), Value::Null);
    }

    #[test]
    fn parse_as_integer_accepts_whole_floats() {
        assert_eq!(Value::parse_as("42", ColumnType::Integer), Value::Int(42));
        assert_eq!(Value::parse_as("12.0", ColumnType::Integer), Value::Int(12));
        assert_eq!(
            Value::parse_as("12.5", ColumnType::Integer),
            Value::Text("12.5".to_string())
        );
    }

    #[test]
    fn parse_as_integer_keeps_out_of_range_numbers_as_text() {
        for raw in ["9223372036854775808", "1e30", "-1e30"] {
            assert_eq!(
                Value::parse_as(raw, ColumnType::Integer),
                Value::Text(raw.to_string())
            );
        }
        assert_eq!(
            Value::parse_as("9223372036854775807", ColumnType::Integer),
            Value::Int(i64::MAX)
        );
        assert_eq!(
            Value::parse_as("-9223372036854775808", ColumnType::Integer),
            Value::Int(i64::MIN)
        );
    }

    #[test]
    fn parse_as_boolean_variants() {
        assert_eq!(Value::parse_as("TRUE", ColumnType::Boolean), Value::Bool(true));
        assert_eq!(Value::parse_as("0", ColumnType::Boolean), Value::Bool(false));
        assert_eq!(
            Value::parse_as("maybe", ColumnType::Boolean),
            Value::Text("maybe".to_string())
        );
    }

    #[test]
    fn from_json_scalars() {
        let json: serde_json::Value = serde_json::json!([1, 2.5, "W", null, true, [1]]);
        let values: Vec<Option<Value>> = json
            .as_array()
            .unwrap()
            .iter()
            .map(Value::from_json)
            .collect();
        assert_eq!(
            values,
            vec![
                Some(Value::Int(1)),
                Some(Value::Float(2.5)),
                Some(Value::Text("W".to_string())),
                Some(Value::Null),
                Some(Value::Bool(true)),
                None,
            ]
        );
    }

    #[test]
    fn conform_widens_int_to_real() {
        assert_eq!(
            Value::Int(3).conform_to(ColumnType::Real),
            Some(Value::Float(3.0))
        );
        assert_eq!(Value::Float(3.0).conform_to(ColumnType::Integer), None);
        assert_eq!(Value::Text("G1".into()).conform_to(ColumnType::Integer), None);
    }

    #[test]
    fn only_int_and_text_are_keys() {
        assert_eq!(Value::Int(7).as_key(), Some(Key::Int(7)));
        assert_eq!(Value::from("G1").as_key(), Some(Key::from("G1")));
        assert_eq!(Value::Float(1.0).as_key(), None);
        assert_eq!(Value::Null.as_key(), None);
    }

    #[test]
    fn value_deserializes_untagged() {
        let v: Vec<Value> = serde_json::from_str(r#"[null, 3, 1.5, "x", false]"#).unwrap();
        assert_eq!(
            v,
            vec![
                Value::Null,
                Value::Int(3),
                Value::Float(1.5),
                Value::Text("x".to_string()),
                Value::Bool(false),
            ]
        );
    }
}
