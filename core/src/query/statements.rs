//! Set-based statements driven by a [`Filter`] instead of a record sequence.

use crate::database::sql_value::SqlValue;
use crate::metadata::{RecordDescriptor, UnsupportedShapeError};
use crate::query::filter::{Filter, FilterError};
use crate::statement::query_builder::{
    build_where_clause, placeholder, qualified_column_list, quote_identifier, TARGET_ALIAS,
};
use crate::statement::OperationKind;

/// New column values for an update-by-filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignments {
    values: Vec<(String, SqlValue)>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.values.push((column.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilteredStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
    /// Descriptor column indices of every returned column, in order.
    pub output_columns: Vec<usize>,
}

fn where_clause(
    descriptor: &RecordDescriptor,
    filter: &Filter,
    first_param: usize,
    params: &mut Vec<SqlValue>,
) -> Result<String, FilterError> {
    match filter.render(descriptor, Some(TARGET_ALIAS), first_param)? {
        Some(fragment) => {
            params.extend(fragment.params);
            Ok(build_where_clause(&[fragment.sql]))
        }
        None => Ok(String::new()),
    }
}

/// `UPDATE <table> AS t SET ... WHERE <filter>`
pub fn build_update_where(
    descriptor: &RecordDescriptor,
    assignments: &Assignments,
    filter: &Filter,
) -> Result<FilteredStatement, FilterError> {
    if assignments.is_empty() {
        return Err(UnsupportedShapeError::NothingToUpdate {
            entity: descriptor.entity.clone(),
            operation: OperationKind::Update,
        }
        .into());
    }

    let mut params = Vec::with_capacity(assignments.len() + filter.parameter_count());
    let mut set_clauses = Vec::with_capacity(assignments.len());

    for (j, (name, value)) in assignments.values.iter().enumerate() {
        let column = descriptor.column(name).ok_or_else(|| descriptor.unknown_column(name))?;

        if column.is_output() {
            return Err(UnsupportedShapeError::InvalidColumnRole {
                entity: descriptor.entity.clone(),
                column: name.clone(),
                reason: "server generated columns cannot be assigned",
            }
            .into());
        }

        set_clauses.push(format!(
            "{} = {}",
            quote_identifier(&column.name),
            placeholder(j + 1, column.sql_type)
        ));
        params.push(value.clone());
    }

    let where_sql = where_clause(descriptor, filter, assignments.len() + 1, &mut params)?;

    Ok(FilteredStatement {
        sql: format!(
            "UPDATE {} AS {} SET {}{}",
            descriptor.table,
            TARGET_ALIAS,
            set_clauses.join(", "),
            where_sql
        ),
        params,
        output_columns: Vec::new(),
    })
}

/// `DELETE FROM <table> AS t WHERE <filter>`
pub fn build_delete_where(
    descriptor: &RecordDescriptor,
    filter: &Filter,
) -> Result<FilteredStatement, FilterError> {
    let mut params = Vec::with_capacity(filter.parameter_count());
    let where_sql = where_clause(descriptor, filter, 1, &mut params)?;

    Ok(FilteredStatement {
        sql: format!("DELETE FROM {} AS {}{}", descriptor.table, TARGET_ALIAS, where_sql),
        params,
        output_columns: Vec::new(),
    })
}

/// `SELECT t."a", t."b" FROM <table> AS t WHERE <filter>`
pub fn build_select_where(
    descriptor: &RecordDescriptor,
    filter: &Filter,
) -> Result<FilteredStatement, FilterError> {
    let columns: Vec<usize> = (0..descriptor.columns.len()).collect();
    let mut params = Vec::with_capacity(filter.parameter_count());
    let where_sql = where_clause(descriptor, filter, 1, &mut params)?;

    Ok(FilteredStatement {
        sql: format!(
            "SELECT {} FROM {} AS {}{}",
            qualified_column_list(descriptor, TARGET_ALIAS, &columns),
            descriptor.table,
            TARGET_ALIAS,
            where_sql
        ),
        params,
        output_columns: columns,
    })
}
