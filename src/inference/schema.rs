use super::detector::TypeLabel;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Schema must be a JSON object")]
    NotAnObject,

    #[error("Invalid type for field '{field}': {message}")]
    InvalidFieldType { field: String, message: String },
}

/// Resolved type of one schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Scalar(TypeLabel),
    Nested(Schema),
}

impl FieldType {
    pub fn as_nested(&self) -> Option<&Schema> {
        match self {
            Self::Nested(schema) => Some(schema),
            Self::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<TypeLabel> {
        match self {
            Self::Scalar(label) => Some(*label),
            Self::Nested(_) => None,
        }
    }
}

/// Field name to resolved type. Fields keep the order of first observation;
/// equality ignores that order.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, FieldType)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a field.
    pub fn insert(&mut self, name: impl Into<String>, field_type: FieldType) {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = field_type,
            None => self.fields.push((name, field_type)),
        }
    }

    pub fn with_scalar(mut self, name: impl Into<String>, label: TypeLabel) -> Self {
        self.insert(name, FieldType::Scalar(label));
        self
    }

    pub fn with_nested(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.insert(name, FieldType::Nested(schema));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldType> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, field_type)| field_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldType)> {
        self.fields
            .iter()
            .map(|(name, field_type)| (name.as_str(), field_type))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> JsonValue {
        let object = self
            .fields
            .iter()
            .map(|(name, field_type)| {
                let value = match field_type {
                    FieldType::Scalar(label) => JsonValue::String(label.as_str().to_string()),
                    FieldType::Nested(schema) => schema.to_json(),
                };
                (name.clone(), value)
            })
            .collect();
        JsonValue::Object(object)
    }

    /// Parses the `{"field": "integer", "nested": {...}}` representation.
    pub fn from_json(value: &JsonValue) -> Result<Self, SchemaError> {
        let object = value.as_object().ok_or(SchemaError::NotAnObject)?;
        let mut schema = Schema::new();
        for (name, raw) in object {
            let field_type = match raw {
                JsonValue::String(label) => FieldType::Scalar(parse_scalar_label(name, label)?),
                JsonValue::Object(_) => FieldType::Nested(Schema::from_json(raw)?),
                other => {
                    return Err(SchemaError::InvalidFieldType {
                        field: name.clone(),
                        message: format!("expected type label or object, got {other}"),
                    });
                }
            };
            schema.insert(name.clone(), field_type);
        }
        Ok(schema)
    }
}

fn parse_scalar_label(field: &str, label: &str) -> Result<TypeLabel, SchemaError> {
    match label.parse::<TypeLabel>() {
        Ok(TypeLabel::Object) => Err(SchemaError::InvalidFieldType {
            field: field.to_string(),
            message: "object fields must be given as a nested schema".to_string(),
        }),
        Ok(parsed) => Ok(parsed),
        Err(message) => Err(SchemaError::InvalidFieldType {
            field: field.to_string(),
            message,
        }),
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .fields
                .iter()
                .all(|(name, field_type)| other.get(name) == Some(field_type))
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, field_type) in &self.fields {
            map.serialize_entry(name, field_type)?;
        }
        map.end()
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Scalar(label) => serializer.serialize_str(label.as_str()),
            Self::Nested(schema) => schema.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SchemaVisitor)
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FieldTypeVisitor)
    }
}

struct SchemaVisitor;

impl<'de> Visitor<'de> for SchemaVisitor {
    type Value = Schema;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of field names to type labels or nested schemas")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Schema, A::Error> {
        let mut schema = Schema::new();
        while let Some((name, field_type)) = access.next_entry::<String, FieldType>()? {
            schema.insert(name, field_type);
        }
        Ok(schema)
    }
}

struct FieldTypeVisitor;

impl<'de> Visitor<'de> for FieldTypeVisitor {
    type Value = FieldType;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a type label string or a nested schema map")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<FieldType, E> {
        parse_scalar_label("<field>", value)
            .map(FieldType::Scalar)
            .map_err(E::custom)
    }

    fn visit_map<A: MapAccess<'de>>(self, access: A) -> Result<FieldType, A::Error> {
        SchemaVisitor.visit_map(access).map(FieldType::Nested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equality_ignores_field_order() {
        let a = Schema::new()
            .with_scalar("name", TypeLabel::String)
            .with_scalar("age", TypeLabel::Integer);
        let b = Schema::new()
            .with_scalar("age", TypeLabel::Integer)
            .with_scalar("name", TypeLabel::String);
        assert_eq!(a, b);
        assert_ne!(a, b.clone().with_scalar("extra", TypeLabel::Null));
    }

    #[test]
    fn test_json_representation() {
        let schema = Schema::new()
            .with_scalar("tags", TypeLabel::Array)
            .with_nested("user", Schema::new().with_scalar("name", TypeLabel::String));
        let value = schema.to_json();
        assert_eq!(value, json!({"tags": "array", "user": {"name": "string"}}));
        assert_eq!(Schema::from_json(&value), Ok(schema.clone()));

        let encoded = serde_json::to_string(&schema).unwrap();
        let decoded: Schema = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, schema);
    }

    #[test]
    fn test_from_json_rejects_bad_labels() {
        assert_eq!(Schema::from_json(&json!([])), Err(SchemaError::NotAnObject));
        assert!(matches!(
            Schema::from_json(&json!({"a": "decimal"})),
            Err(SchemaError::InvalidFieldType { .. })
        ));
        assert!(matches!(
            Schema::from_json(&json!({"a": "object"})),
            Err(SchemaError::InvalidFieldType { .. })
        ));
        assert!(matches!(
            Schema::from_json(&json!({"a": 1})),
            Err(SchemaError::InvalidFieldType { .. })
        ));
    }
}
