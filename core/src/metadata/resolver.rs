use std::any::{type_name, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::metadata::entity::Entity;
use crate::metadata::schema::{ColumnDescriptor, EntitySchema, Generated, KeyRole};
use crate::statement::query_builder::format_table_name;
use crate::statement::OperationKind;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UnsupportedShapeError {
    #[error("{entity} declares no columns")]
    NoColumns { entity: String },

    #[error("{entity} declares an empty table name")]
    EmptyTableName { entity: String },

    #[error("{entity} declares column `{column}` more than once")]
    DuplicateColumn { entity: String, column: String },

    #[error("{entity} column `{column}` has an invalid role: {reason}")]
    InvalidColumnRole { entity: String, column: String, reason: &'static str },

    #[error("{entity} has no key column, {operation} needs one")]
    MissingKey { entity: String, operation: OperationKind },

    #[error("{entity} has no updatable column, {operation} has nothing to set")]
    NothingToUpdate { entity: String, operation: OperationKind },

    #[error("{entity} has no column named `{column}`")]
    UnknownColumn { entity: String, column: String },

    #[error("{entity} column `{column}` is not produced by the output clause of {operation}")]
    NotAnOutputColumn { entity: String, column: String, operation: OperationKind },

    #[error("{operation} on {entity} does not accept a filter")]
    FilterNotSupported { entity: String, operation: OperationKind },
}

/// Resolved, immutable description of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDescriptor {
    pub entity: String,
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    key_columns: Vec<usize>,
    insertable_columns: Vec<usize>,
    updatable_columns: Vec<usize>,
    identity_columns: Vec<usize>,
    computed_columns: Vec<usize>,
}

impl RecordDescriptor {
    pub fn from_schema(
        entity: impl Into<String>,
        schema: EntitySchema,
    ) -> Result<Self, UnsupportedShapeError> {
        let entity = entity.into();

        if schema.table.trim().is_empty() {
            return Err(UnsupportedShapeError::EmptyTableName { entity });
        }

        if schema.columns.is_empty() {
            return Err(UnsupportedShapeError::NoColumns { entity });
        }

        let mut seen = HashSet::new();
        for column in &schema.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(UnsupportedShapeError::DuplicateColumn {
                    entity,
                    column: column.name.clone(),
                });
            }

            let reason = match (column.key, column.generated) {
                (KeyRole::Explicit, Generated::Identity) => {
                    Some("an explicit key is supplied by the caller and cannot be an identity")
                }
                (KeyRole::Explicit, Generated::Computed) | (KeyRole::Primary, Generated::Computed) => {
                    Some("a computed column cannot be used as a key")
                }
                _ => None,
            };

            if let Some(reason) = reason {
                return Err(UnsupportedShapeError::InvalidColumnRole {
                    entity,
                    column: column.name.clone(),
                    reason,
                });
            }
        }

        let indices = |predicate: fn(&ColumnDescriptor) -> bool| -> Vec<usize> {
            schema
                .columns
                .iter()
                .enumerate()
                .filter(|(_, column)| predicate(column))
                .map(|(i, _)| i)
                .collect()
        };

        let key_columns = indices(ColumnDescriptor::is_key);
        let insertable_columns = indices(ColumnDescriptor::is_insertable);
        let updatable_columns = indices(ColumnDescriptor::is_updatable);
        let identity_columns = indices(ColumnDescriptor::is_identity);
        let computed_columns = indices(ColumnDescriptor::is_computed);

        Ok(Self {
            entity,
            table: format_table_name(&schema.table),
            columns: schema.columns,
            key_columns,
            insertable_columns,
            updatable_columns,
            identity_columns,
            computed_columns,
        })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn key_columns(&self) -> &[usize] {
        &self.key_columns
    }

    pub fn insertable_columns(&self) -> &[usize] {
        &self.insertable_columns
    }

    pub fn updatable_columns(&self) -> &[usize] {
        &self.updatable_columns
    }

    pub fn identity_columns(&self) -> &[usize] {
        &self.identity_columns
    }

    pub fn computed_columns(&self) -> &[usize] {
        &self.computed_columns
    }

    /// Columns reported back by the output clause of `kind`, in declaration order.
    pub fn output_columns(&self, kind: OperationKind) -> Vec<usize> {
        match kind {
            OperationKind::Insert | OperationKind::Upsert => self
                .columns
                .iter()
                .enumerate()
                .filter(|(_, column)| column.is_output())
                .map(|(i, _)| i)
                .collect(),
            OperationKind::Update => self.computed_columns.clone(),
            OperationKind::Delete => Vec::new(),
        }
    }

    pub fn require_key(&self, kind: OperationKind) -> Result<&[usize], UnsupportedShapeError> {
        if kind.needs_key() && self.key_columns.is_empty() {
            return Err(UnsupportedShapeError::MissingKey {
                entity: self.entity.clone(),
                operation: kind,
            });
        }

        Ok(&self.key_columns)
    }

    pub fn unknown_column(&self, column: &str) -> UnsupportedShapeError {
        UnsupportedShapeError::UnknownColumn {
            entity: self.entity.clone(),
            column: column.to_string(),
        }
    }
}

static DESCRIPTORS: Lazy<RwLock<HashMap<TypeId, Arc<RecordDescriptor>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Returns the cached descriptor for `T`, building it on first use.
pub fn resolve<T: Entity>() -> Result<Arc<RecordDescriptor>, UnsupportedShapeError> {
    let type_id = TypeId::of::<T>();

    if let Some(descriptor) =
        DESCRIPTORS.read().unwrap_or_else(|poisoned| poisoned.into_inner()).get(&type_id)
    {
        return Ok(Arc::clone(descriptor));
    }

    let descriptor = Arc::new(RecordDescriptor::from_schema(type_name::<T>(), T::schema())?);

    let mut descriptors = DESCRIPTORS.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    // another caller may have won the race, keep the first one
    let descriptor = descriptors.entry(type_id).or_insert(descriptor);

    debug!(
        "Resolved {} -> {} ({} columns)",
        descriptor.entity,
        descriptor.table,
        descriptor.columns.len()
    );

    Ok(Arc::clone(descriptor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sql_value::SqlType;
    use crate::test_support::{Keyless, Member, Order};

    #[test]
    fn test_resolve_is_memoized() {
        let first = resolve::<Order>().unwrap();
        let second = resolve::<Order>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_column_sets() {
        let descriptor = resolve::<Order>().unwrap();
        assert_eq!(descriptor.table, "\"public\".\"orders\"");
        assert_eq!(descriptor.key_columns(), &[0]);
        assert_eq!(descriptor.insertable_columns(), &[1, 2]);
        assert_eq!(descriptor.updatable_columns(), &[1, 2]);
        assert_eq!(descriptor.output_columns(OperationKind::Insert), vec![0, 3]);
        assert_eq!(descriptor.output_columns(OperationKind::Update), vec![3]);
        assert!(descriptor.output_columns(OperationKind::Delete).is_empty());
    }

    #[test]
    fn test_composite_explicit_keys() {
        let descriptor = resolve::<Member>().unwrap();
        assert_eq!(descriptor.key_columns(), &[0, 1]);
        assert_eq!(descriptor.insertable_columns(), &[0, 1, 2]);
        assert_eq!(descriptor.updatable_columns(), &[2]);
        assert!(descriptor.output_columns(OperationKind::Upsert).is_empty());
    }

    #[test]
    fn test_missing_key() {
        let descriptor = resolve::<Keyless>().unwrap();
        assert!(descriptor.require_key(OperationKind::Insert).is_ok());

        let err = descriptor.require_key(OperationKind::Update).unwrap_err();
        assert!(matches!(
            err,
            UnsupportedShapeError::MissingKey { operation: OperationKind::Update, .. }
        ));
    }

    #[test]
    fn test_rejects_empty_schema() {
        let err = RecordDescriptor::from_schema("Empty", EntitySchema::new("empty")).unwrap_err();
        assert_eq!(err, UnsupportedShapeError::NoColumns { entity: "Empty".to_string() });

        let err = RecordDescriptor::from_schema(
            "NoTable",
            EntitySchema::new("  ").column("a", SqlType::Text),
        )
        .unwrap_err();
        assert_eq!(err, UnsupportedShapeError::EmptyTableName { entity: "NoTable".to_string() });
    }

    #[test]
    fn test_rejects_duplicate_column() {
        let schema = EntitySchema::new("t")
            .identity("id", SqlType::BigInt)
            .computed("id", SqlType::BigInt);

        let err = RecordDescriptor::from_schema("Dup", schema).unwrap_err();
        assert_eq!(
            err,
            UnsupportedShapeError::DuplicateColumn {
                entity: "Dup".to_string(),
                column: "id".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_invalid_roles() {
        let schema = EntitySchema::new("t").with_column(ColumnDescriptor::new(
            "code",
            SqlType::Text,
            KeyRole::Explicit,
            Generated::Identity,
        ));
        let err = RecordDescriptor::from_schema("Bad", schema).unwrap_err();
        assert!(matches!(err, UnsupportedShapeError::InvalidColumnRole { .. }));

        let schema = EntitySchema::new("t").with_column(ColumnDescriptor::new(
            "total",
            SqlType::Numeric,
            KeyRole::Primary,
            Generated::Computed,
        ));
        let err = RecordDescriptor::from_schema("Bad", schema).unwrap_err();
        assert!(matches!(err, UnsupportedShapeError::InvalidColumnRole { .. }));
    }
}
