use super::naming::{child_table_name, sanitize_identifier};
use super::registry::RegistryError;
use crate::core::{Column, ColumnType, ForeignKey, TableSchema};
use crate::inference::{FieldType, Schema, TypeLabel};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

pub const ID_COLUMN: &str = "id";
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const PARENT_ID_COLUMN: &str = "parent_id";

/// One schema-derived column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    /// Sanitized physical column name.
    pub name: String,
    /// Field name as it appeared in the documents.
    pub source_field: String,
    pub column_type: ColumnType,
}

impl ColumnDefinition {
    /// Input keys match either the original field name or the column name.
    pub fn matches_key(&self, key: &str) -> bool {
        self.source_field == key || self.name == key
    }
}

/// Main table of a collection plus one child table per nested-object field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionDefinition {
    pub table_name: String,
    pub columns: Vec<ColumnDefinition>,
    pub children: Vec<Arc<ChildCollectionDefinition>>,
}

/// Child table holding the decomposed values of one nested-object field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChildCollectionDefinition {
    pub table_name: String,
    pub parent_table: String,
    /// Nested field name as it appeared in the documents.
    pub source_field: String,
    /// Sanitized nested field name, the suffix of `table_name`.
    pub field_name: String,
    pub columns: Vec<ColumnDefinition>,
}

impl CollectionDefinition {
    pub(crate) fn derive(table_name: String, schema: &Schema) -> Result<Self, RegistryError> {
        let mut columns = ColumnSet::new(&table_name, &[ID_COLUMN, CREATED_AT_COLUMN]);
        let mut children = Vec::new();
        let mut child_fields = HashSet::new();

        for (field, field_type) in schema.iter() {
            match field_type {
                FieldType::Scalar(label) => columns.push(field, column_type_for(*label))?,
                FieldType::Nested(nested) => {
                    let field_name = sanitize_identifier(field)?;
                    if !child_fields.insert(field_name.clone()) {
                        warn!(
                            table = %table_name,
                            field,
                            "skipping nested field that collides with an earlier child table"
                        );
                        continue;
                    }
                    children.push(Arc::new(ChildCollectionDefinition::derive(
                        &table_name,
                        field,
                        field_name,
                        nested,
                    )?));
                }
            }
        }

        let columns = columns.into_inner();
        Ok(Self {
            table_name,
            columns,
            children,
        })
    }

    pub fn table_schema(&self) -> TableSchema {
        let mut physical = vec![
            Column::new(ID_COLUMN, ColumnType::Integer).primary_key(),
            Column::new(CREATED_AT_COLUMN, ColumnType::Timestamp).not_null(),
        ];
        physical.extend(data_columns(&self.columns));
        TableSchema::new(self.table_name.clone(), physical)
    }

    /// Main table first, then children in field order.
    pub fn table_schemas(&self) -> Vec<TableSchema> {
        let mut schemas = vec![self.table_schema()];
        schemas.extend(self.children.iter().map(|child| child.table_schema()));
        schemas
    }

    pub fn child_for_key(&self, key: &str) -> Option<&Arc<ChildCollectionDefinition>> {
        self.children
            .iter()
            .find(|child| child.source_field == key || child.field_name == key)
    }
}

impl ChildCollectionDefinition {
    fn derive(
        parent_table: &str,
        source_field: &str,
        field_name: String,
        schema: &Schema,
    ) -> Result<Self, RegistryError> {
        let table_name = child_table_name(parent_table, &field_name);
        let mut columns = ColumnSet::new(
            &table_name,
            &[ID_COLUMN, PARENT_ID_COLUMN, CREATED_AT_COLUMN],
        );
        for (field, field_type) in schema.iter() {
            let column_type = match field_type {
                FieldType::Scalar(label) => column_type_for(*label),
                // a third table level is never created
                FieldType::Nested(_) => ColumnType::Json,
            };
            columns.push(field, column_type)?;
        }

        let columns = columns.into_inner();
        Ok(Self {
            table_name,
            parent_table: parent_table.to_string(),
            source_field: source_field.to_string(),
            field_name,
            columns,
        })
    }

    pub fn table_schema(&self) -> TableSchema {
        let mut physical = vec![
            Column::new(ID_COLUMN, ColumnType::Integer).primary_key(),
            Column::new(PARENT_ID_COLUMN, ColumnType::Integer).not_null(),
            Column::new(CREATED_AT_COLUMN, ColumnType::Timestamp).not_null(),
        ];
        physical.extend(data_columns(&self.columns));
        TableSchema::new(self.table_name.clone(), physical).with_foreign_key(ForeignKey {
            column: PARENT_ID_COLUMN.to_string(),
            references_table: self.parent_table.clone(),
        })
    }
}

/// A registered physical table, main or child. Both are addressable by the
/// generic CRUD operations.
#[derive(Debug, Clone)]
pub enum TableEntry {
    Main(Arc<CollectionDefinition>),
    Child(Arc<ChildCollectionDefinition>),
}

impl TableEntry {
    pub fn table_name(&self) -> &str {
        match self {
            Self::Main(definition) => &definition.table_name,
            Self::Child(definition) => &definition.table_name,
        }
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        match self {
            Self::Main(definition) => &definition.columns,
            Self::Child(definition) => &definition.columns,
        }
    }

    pub fn table_schema(&self) -> TableSchema {
        match self {
            Self::Main(definition) => definition.table_schema(),
            Self::Child(definition) => definition.table_schema(),
        }
    }

    pub fn column_for_key(&self, key: &str) -> Option<&ColumnDefinition> {
        self.columns().iter().find(|column| column.matches_key(key))
    }
}

fn column_type_for(label: TypeLabel) -> ColumnType {
    match label {
        TypeLabel::Integer => ColumnType::Integer,
        TypeLabel::Float => ColumnType::Float,
        TypeLabel::Boolean => ColumnType::Boolean,
        TypeLabel::Array | TypeLabel::Object => ColumnType::Json,
        TypeLabel::Null | TypeLabel::String => ColumnType::Text,
    }
}

fn data_columns(columns: &[ColumnDefinition]) -> impl Iterator<Item = Column> + '_ {
    columns
        .iter()
        .map(|column| Column::new(column.name.clone(), column.column_type))
}

/// Collects data columns while keeping names unique within one table.
struct ColumnSet<'a> {
    table_name: &'a str,
    taken: HashSet<String>,
    columns: Vec<ColumnDefinition>,
}

impl<'a> ColumnSet<'a> {
    fn new(table_name: &'a str, reserved: &[&str]) -> Self {
        Self {
            table_name,
            taken: reserved.iter().map(|name| name.to_string()).collect(),
            columns: Vec::new(),
        }
    }

    fn push(&mut self, field: &str, column_type: ColumnType) -> Result<(), RegistryError> {
        let name = sanitize_identifier(field)?;
        if !self.taken.insert(name.clone()) {
            warn!(
                table = self.table_name,
                field,
                column = %name,
                "skipping field whose column name is reserved or already taken"
            );
            return Ok(());
        }
        self.columns.push(ColumnDefinition {
            name,
            source_field: field.to_string(),
            column_type,
        });
        Ok(())
    }

    fn into_inner(self) -> Vec<ColumnDefinition> {
        self.columns
    }
}
