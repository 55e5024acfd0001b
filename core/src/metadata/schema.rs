use crate::database::sql_value::SqlType;

/// Whether a column takes part in row matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    None,
    /// Primary key. May be server generated (see [`Generated::Identity`]).
    Primary,
    /// Key supplied by the caller, never generated by the server.
    Explicit,
}

/// Whether the server produces the column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generated {
    None,
    /// Filled by the server on insert (identity / serial / default-generated key).
    Identity,
    /// Read-only, computed by the server on every write.
    Computed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub sql_type: SqlType,
    pub key: KeyRole,
    pub generated: Generated,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, sql_type: SqlType, key: KeyRole, generated: Generated) -> Self {
        Self { name: name.into(), sql_type, key, generated }
    }

    pub fn is_key(&self) -> bool {
        self.key != KeyRole::None
    }

    pub fn is_identity(&self) -> bool {
        self.generated == Generated::Identity
    }

    pub fn is_computed(&self) -> bool {
        self.generated == Generated::Computed
    }

    /// Written by the insert branch.
    pub fn is_insertable(&self) -> bool {
        self.generated == Generated::None
    }

    /// Written by the update branch.
    pub fn is_updatable(&self) -> bool {
        !self.is_key() && self.generated == Generated::None
    }

    /// Reported back through the output clause.
    pub fn is_output(&self) -> bool {
        self.generated != Generated::None
    }
}

/// Explicit schema declaration for an [`Entity`](crate::Entity).
///
/// Columns keep their declaration order; parameter positions and output
/// columns are derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl EntitySchema {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into(), columns: Vec::new() }
    }

    /// Plain read/write column.
    pub fn column(self, name: &str, sql_type: SqlType) -> Self {
        self.with_column(ColumnDescriptor::new(name, sql_type, KeyRole::None, Generated::None))
    }

    /// Primary key supplied by the caller.
    pub fn primary_key(self, name: &str, sql_type: SqlType) -> Self {
        self.with_column(ColumnDescriptor::new(name, sql_type, KeyRole::Primary, Generated::None))
    }

    /// Primary key generated by the server on insert.
    pub fn identity_key(self, name: &str, sql_type: SqlType) -> Self {
        self.with_column(ColumnDescriptor::new(
            name,
            sql_type,
            KeyRole::Primary,
            Generated::Identity,
        ))
    }

    pub fn explicit_key(self, name: &str, sql_type: SqlType) -> Self {
        self.with_column(ColumnDescriptor::new(name, sql_type, KeyRole::Explicit, Generated::None))
    }

    /// Server generated on insert, never matched on.
    pub fn identity(self, name: &str, sql_type: SqlType) -> Self {
        self.with_column(ColumnDescriptor::new(name, sql_type, KeyRole::None, Generated::Identity))
    }

    pub fn computed(self, name: &str, sql_type: SqlType) -> Self {
        self.with_column(ColumnDescriptor::new(name, sql_type, KeyRole::None, Generated::Computed))
    }

    pub fn with_column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_declaration_order() {
        let schema = EntitySchema::new("public.orders")
            .identity_key("id", SqlType::BigInt)
            .column("customer", SqlType::Text)
            .computed("total", SqlType::Numeric);

        let names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "customer", "total"]);
        assert_eq!(schema.table, "public.orders");
    }

    #[test]
    fn test_column_roles() {
        let id = ColumnDescriptor::new("id", SqlType::BigInt, KeyRole::Primary, Generated::Identity);
        assert!(id.is_key());
        assert!(id.is_output());
        assert!(!id.is_insertable());
        assert!(!id.is_updatable());

        let code = ColumnDescriptor::new("code", SqlType::Text, KeyRole::Explicit, Generated::None);
        assert!(code.is_key());
        assert!(code.is_insertable());
        assert!(!code.is_updatable());
        assert!(!code.is_output());

        let total = ColumnDescriptor::new("total", SqlType::Numeric, KeyRole::None, Generated::Computed);
        assert!(total.is_computed());
        assert!(!total.is_insertable());
        assert!(total.is_output());

        let name = ColumnDescriptor::new("name", SqlType::Text, KeyRole::None, Generated::None);
        assert!(name.is_updatable());
        assert!(name.is_insertable());
    }
}
