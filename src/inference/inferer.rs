use super::detector::{TypeLabel, detect};
use super::schema::{FieldType, Schema};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

type JsonObject = Map<String, JsonValue>;

/// Infers one unified schema from a batch of documents.
///
/// Every field seen in any document appears once in the result. Fields that
/// were observed holding an object resolve to a nested schema inferred from
/// exactly those object values; any scalar values seen for the same field are
/// discarded. All other fields resolve through [`merge_scalar_types`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaInferer;

impl SchemaInferer {
    pub fn new() -> Self {
        Self
    }

    /// Non-object entries of `documents` are skipped.
    pub fn infer(&self, documents: &[JsonValue]) -> Schema {
        let objects: Vec<&JsonObject> = documents.iter().filter_map(JsonValue::as_object).collect();
        self.infer_objects(&objects)
    }

    fn infer_objects(&self, objects: &[&JsonObject]) -> Schema {
        let mut order: Vec<&str> = Vec::new();
        let mut observed: HashMap<&str, BTreeSet<TypeLabel>> = HashMap::new();

        for &object in objects {
            for (field, value) in object.iter() {
                let labels = observed.entry(field.as_str()).or_insert_with(|| {
                    order.push(field.as_str());
                    BTreeSet::new()
                });
                labels.insert(detect(value));
            }
        }

        let mut schema = Schema::new();
        for field in order {
            let labels = &observed[field];

            if labels.contains(&TypeLabel::Object) {
                let nested: Vec<&JsonObject> = objects
                    .iter()
                    .filter_map(|&object| object.get(field).and_then(JsonValue::as_object))
                    .collect();
                if labels.len() > 1 {
                    debug!(field, ?labels, "discarding scalar observations for object field");
                }
                schema.insert(field, FieldType::Nested(self.infer_objects(&nested)));
                continue;
            }

            let resolved = merge_scalar_types(labels);
            if labels.len() > 1 {
                debug!(field, ?labels, resolved = %resolved, "resolved type conflict");
            }
            schema.insert(field, FieldType::Scalar(resolved));
        }

        schema
    }
}

/// Resolves the distinct labels observed for one field into a single label.
///
/// - one label: that label
/// - any subset of {integer, float}: float
/// - exactly {boolean, integer}: integer
/// - anything else: string
pub fn merge_scalar_types(labels: &BTreeSet<TypeLabel>) -> TypeLabel {
    if labels.len() == 1
        && let Some(label) = labels.iter().next()
    {
        return *label;
    }

    if !labels.is_empty()
        && labels
            .iter()
            .all(|label| matches!(label, TypeLabel::Integer | TypeLabel::Float))
    {
        return TypeLabel::Float;
    }

    if labels.len() == 2
        && labels.contains(&TypeLabel::Boolean)
        && labels.contains(&TypeLabel::Integer)
    {
        return TypeLabel::Integer;
    }

    TypeLabel::String
}
