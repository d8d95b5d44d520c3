use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Primitive label assigned to a single JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeLabel {
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Object,
    Array,
}

impl TypeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

impl fmt::Display for TypeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(Self::Null),
            "boolean" => Ok(Self::Boolean),
            "integer" => Ok(Self::Integer),
            "float" => Ok(Self::Float),
            "string" => Ok(Self::String),
            "object" => Ok(Self::Object),
            "array" => Ok(Self::Array),
            other => Err(format!("unknown type label '{other}'")),
        }
    }
}

/// Classifies a value. Booleans are matched before numbers so they never
/// resolve to `integer`. Numbers an integer column cannot hold (outside the
/// `i64` range, fractional) are floats.
pub fn detect(value: &JsonValue) -> TypeLabel {
    match value {
        JsonValue::Null => TypeLabel::Null,
        JsonValue::Bool(_) => TypeLabel::Boolean,
        JsonValue::Number(n) if n.is_i64() => TypeLabel::Integer,
        JsonValue::Number(_) => TypeLabel::Float,
        JsonValue::Object(_) => TypeLabel::Object,
        JsonValue::Array(_) => TypeLabel::Array,
        JsonValue::String(_) => TypeLabel::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect_labels() {
        assert_eq!(detect(&json!(null)), TypeLabel::Null);
        assert_eq!(detect(&json!(true)), TypeLabel::Boolean);
        assert_eq!(detect(&json!(false)), TypeLabel::Boolean);
        assert_eq!(detect(&json!(3)), TypeLabel::Integer);
        assert_eq!(detect(&json!(-3)), TypeLabel::Integer);
        assert_eq!(detect(&json!(i64::MAX)), TypeLabel::Integer);
        assert_eq!(detect(&json!(u64::MAX)), TypeLabel::Float);
        assert_eq!(detect(&json!(3.5)), TypeLabel::Float);
        assert_eq!(detect(&json!({})), TypeLabel::Object);
        assert_eq!(detect(&json!([])), TypeLabel::Array);
        assert_eq!(detect(&json!("x")), TypeLabel::String);
    }

    #[test]
    fn test_labels_round_trip_through_str() {
        for label in [
            TypeLabel::Null,
            TypeLabel::Boolean,
            TypeLabel::Integer,
            TypeLabel::Float,
            TypeLabel::String,
            TypeLabel::Object,
            TypeLabel::Array,
        ] {
            assert_eq!(label.as_str().parse::<TypeLabel>(), Ok(label));
        }
        assert!("decimal".parse::<TypeLabel>().is_err());
    }
}
