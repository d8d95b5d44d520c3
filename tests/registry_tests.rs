/// Collection registry tests
///
/// Run with: cargo test --test registry_tests

use autorestdb::core::ColumnType;
use autorestdb::inference::{Schema, SchemaInferer, TypeLabel};
use autorestdb::registry::{Registry, RegistryError, TableEntry};
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;

/// System columns in table order, then data columns sorted by name.
fn column_types(entry: &TableEntry, system_columns: usize) -> Vec<(String, ColumnType)> {
    let schema = entry.table_schema();
    let mut columns: Vec<_> = schema
        .columns()
        .iter()
        .map(|c| (c.name.clone(), c.column_type))
        .collect();
    columns[system_columns..].sort_by(|a, b| a.0.cmp(&b.0));
    columns
}

#[test]
fn test_register_main_and_child_tables() {
    let registry = Registry::new();
    let schema = SchemaInferer::new().infer(&[json!({
        "Full Name": "Ana",
        "age": 30,
        "score": 9.5,
        "vip": true,
        "tags": ["a"],
        "nickname": null,
        "address": {"city": "Porto", "geo": {"lat": 41.1}}
    })]);

    let registration = registry.register("Clientes VIP", &schema).unwrap();
    assert!(registration.created);

    let definition = registration.definition;
    assert_eq!(definition.table_name, "clientes_vip");
    assert_eq!(definition.children.len(), 1);

    let main = registry.table("clientes_vip").unwrap().unwrap();
    assert_eq!(
        column_types(&main, 2),
        vec![
            ("id".to_string(), ColumnType::Integer),
            ("created_at".to_string(), ColumnType::Timestamp),
            ("age".to_string(), ColumnType::Integer),
            ("full_name".to_string(), ColumnType::Text),
            ("nickname".to_string(), ColumnType::Text),
            ("score".to_string(), ColumnType::Float),
            ("tags".to_string(), ColumnType::Json),
            ("vip".to_string(), ColumnType::Boolean),
        ]
    );

    let child = registry.table("clientes_vip__address").unwrap().unwrap();
    assert!(matches!(child, TableEntry::Child(_)));
    assert_eq!(
        column_types(&child, 3),
        vec![
            ("id".to_string(), ColumnType::Integer),
            ("parent_id".to_string(), ColumnType::Integer),
            ("created_at".to_string(), ColumnType::Timestamp),
            ("city".to_string(), ColumnType::Text),
            ("geo".to_string(), ColumnType::Json),
        ]
    );

    let fk = child.table_schema().foreign_key().cloned().unwrap();
    assert_eq!(fk.column, "parent_id");
    assert_eq!(fk.references_table, "clientes_vip");
}

#[test]
fn test_null_columns_are_nullable_text() {
    let registry = Registry::new();
    let schema = Schema::new().with_scalar("maybe", TypeLabel::Null);
    registry.register("things", &schema).unwrap();

    let table_schema = registry.table("things").unwrap().unwrap().table_schema();
    let column = table_schema.get_column("maybe").unwrap();
    assert_eq!(column.column_type, ColumnType::Text);
    assert!(column.nullable);
}

#[test]
fn test_reregistration_keeps_first_definition() {
    let registry = Registry::new();
    let first = Schema::new().with_scalar("name", TypeLabel::String);
    let second = Schema::new()
        .with_scalar("name", TypeLabel::Integer)
        .with_scalar("email", TypeLabel::String);

    let a = registry.register("clientes", &first).unwrap();
    let b = registry.register("CLIENTES", &second).unwrap();

    assert!(a.created);
    assert!(!b.created);
    assert!(Arc::ptr_eq(&a.definition, &b.definition));
    assert_eq!(b.definition.columns.len(), 1);
    assert_eq!(b.definition.columns[0].column_type, ColumnType::Text);
}

#[test]
fn test_invalid_names_are_rejected() {
    let registry = Registry::new();
    let schema = Schema::new();
    assert!(matches!(
        registry.register("  ?? ", &schema),
        Err(RegistryError::InvalidName(_))
    ));
    assert!(registry.collections().unwrap().is_empty());
}

#[test]
fn test_reserved_and_colliding_fields_are_skipped() {
    let registry = Registry::new();
    let schema = SchemaInferer::new().infer(&[json!({
        "id": 99,
        "created_at": "yesterday",
        "first name": "Ana",
        "first_name": "Ana",
        "items": {"parent_id": 5, "sku": "X"}
    })]);
    let definition = registry.register("orders", &schema).unwrap().definition;

    let names: Vec<&str> = definition.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["first_name"]);
    assert_eq!(definition.columns[0].source_field, "first name");

    let child_columns: Vec<&str> = definition.children[0]
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(child_columns, vec!["sku"]);
}

#[test]
fn test_lookup_by_unsanitized_names() {
    let registry = Registry::new();
    let schema = Schema::new().with_nested(
        "Line Items",
        Schema::new().with_scalar("qty", TypeLabel::Integer),
    );
    registry.register("Sales Orders", &schema).unwrap();

    assert!(registry.contains("sales orders").unwrap());
    assert!(registry.contains("Sales-Orders").unwrap());
    assert!(registry.contains("sales_orders__line_items").unwrap());
    assert!(registry.contains("Sales Orders__Line Items").unwrap());
    assert!(!registry.contains("sales").unwrap());
    assert!(registry.collection("sales_orders__line_items").unwrap().is_none());

    let listed: Vec<String> = registry
        .collections()
        .unwrap()
        .iter()
        .map(|d| d.table_name.clone())
        .collect();
    assert_eq!(listed, vec!["sales_orders"]);
}

#[test]
fn test_concurrent_first_registration_yields_one_definition() {
    let registry = Arc::new(Registry::new());
    let num_threads = 8;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let schema = Schema::new().with_scalar(format!("field_{i}"), TypeLabel::Integer);
                barrier.wait();
                registry.register("race", &schema).unwrap()
            })
        })
        .collect();

    let registrations: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(registrations.iter().filter(|r| r.created).count(), 1);
    let winner = registrations.iter().find(|r| r.created).unwrap();
    for registration in &registrations {
        assert!(Arc::ptr_eq(&registration.definition, &winner.definition));
    }
    assert_eq!(registry.collections().unwrap().len(), 1);
}
