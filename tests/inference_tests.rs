/// Schema inference tests
///
/// Run with: cargo test --test inference_tests

use autorestdb::inference::{FieldType, Schema, SchemaInferer, TypeLabel, detect};
use serde_json::json;

#[test]
fn test_detect_labels() {
    assert_eq!(detect(&json!(null)), TypeLabel::Null);
    assert_eq!(detect(&json!(true)), TypeLabel::Boolean);
    assert_eq!(detect(&json!(3)), TypeLabel::Integer);
    assert_eq!(detect(&json!(-3)), TypeLabel::Integer);
    assert_eq!(detect(&json!(u64::MAX)), TypeLabel::Float);
    assert_eq!(detect(&json!(3.5)), TypeLabel::Float);
    assert_eq!(detect(&json!({})), TypeLabel::Object);
    assert_eq!(detect(&json!([])), TypeLabel::Array);
    assert_eq!(detect(&json!("x")), TypeLabel::String);
}

#[test]
fn test_empty_input_gives_empty_schema() {
    assert!(SchemaInferer::new().infer(&[]).is_empty());
}

#[test]
fn test_nested_documents() {
    let docs = vec![
        json!({"user": {"name": "Ana", "active": true}}),
        json!({"user": {"name": "Carlos", "active": false}}),
    ];
    let schema = SchemaInferer::new().infer(&docs);

    assert_eq!(
        schema.to_json(),
        json!({"user": {"name": "string", "active": "boolean"}})
    );
}

#[test]
fn test_integer_and_float_merge_to_float() {
    let docs = vec![json!({"value": 10}), json!({"value": 10.5})];
    let schema = SchemaInferer::new().infer(&docs);
    assert_eq!(schema.to_json(), json!({"value": "float"}));
}

#[test]
fn test_conflicts_fall_back_to_string() {
    let docs = vec![
        json!({"code": 1, "flag": true, "note": null}),
        json!({"code": "A1", "flag": 0, "note": "n"}),
    ];
    let schema = SchemaInferer::new().infer(&docs);
    assert_eq!(
        schema,
        Schema::new()
            .with_scalar("code", TypeLabel::String)
            .with_scalar("flag", TypeLabel::Integer)
            .with_scalar("note", TypeLabel::String)
    );
}

#[test]
fn test_missing_fields_keep_observed_type() {
    let docs = vec![json!({"a": 1}), json!({"b": [1, 2]})];
    let schema = SchemaInferer::new().infer(&docs);
    assert_eq!(schema.get("a"), Some(&FieldType::Scalar(TypeLabel::Integer)));
    assert_eq!(schema.get("b"), Some(&FieldType::Scalar(TypeLabel::Array)));
}

#[test]
fn test_object_wins_over_scalars() {
    let docs = vec![
        json!({"address": "unknown"}),
        json!({"address": {"city": "Lisboa"}}),
        json!({"address": 42}),
    ];
    let schema = SchemaInferer::new().infer(&docs);
    assert_eq!(
        schema,
        Schema::new().with_nested(
            "address",
            Schema::new().with_scalar("city", TypeLabel::String)
        )
    );
}

#[test]
fn test_nested_fields_merge_recursively() {
    let docs = vec![
        json!({"stats": {"score": 1, "meta": {"source": "a"}}}),
        json!({"stats": {"score": 2.5}}),
    ];
    let schema = SchemaInferer::new().infer(&docs);
    assert_eq!(
        schema.to_json(),
        json!({"stats": {"score": "float", "meta": {"source": "string"}}})
    );
}

#[test]
fn test_inference_is_deterministic() {
    let docs = vec![
        json!({"name": "Ana", "age": 30, "tags": ["a"]}),
        json!({"name": "Bia", "age": 31.5, "extra": null}),
    ];
    let inferer = SchemaInferer::new();
    let first = inferer.infer(&docs);
    let second = inferer.infer(&docs);
    assert_eq!(first, second);
    assert_eq!(first.to_json(), second.to_json());
}
