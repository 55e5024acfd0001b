//! Per-record statements used when a backend cannot run the bulk MERGE path.

use crate::metadata::{RecordDescriptor, UnsupportedShapeError};
use crate::statement::query_builder::{
    build_key_predicate, build_returning, build_where_clause, column_list, placeholder,
    quote_identifier,
};
use crate::statement::OperationKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleRowStatement {
    pub sql: String,
    pub bound_columns: Vec<usize>,
    pub output_columns: Vec<usize>,
}

fn returning(descriptor: &RecordDescriptor, columns: &[usize]) -> String {
    let items: Vec<String> =
        columns.iter().map(|&i| quote_identifier(&descriptor.columns[i].name)).collect();
    build_returning(&items)
}

/// `INSERT INTO t (...) VALUES ($1, ...) RETURNING <identity and computed columns>`
pub fn build_insert_one(descriptor: &RecordDescriptor) -> SingleRowStatement {
    let bound = descriptor.insertable_columns().to_vec();
    let outputs = descriptor.output_columns(OperationKind::Insert);

    let body = if bound.is_empty() {
        "DEFAULT VALUES".to_string()
    } else {
        let placeholders: Vec<String> = bound
            .iter()
            .enumerate()
            .map(|(j, &i)| placeholder(j + 1, descriptor.columns[i].sql_type))
            .collect();
        format!("({}) VALUES ({})", column_list(descriptor, &bound), placeholders.join(", "))
    };

    SingleRowStatement {
        sql: format!("INSERT INTO {} {}{}", descriptor.table, body, returning(descriptor, &outputs)),
        bound_columns: bound,
        output_columns: outputs,
    }
}

/// `UPDATE t SET ... WHERE <keys> RETURNING <computed columns>`
pub fn build_update_one(
    descriptor: &RecordDescriptor,
) -> Result<SingleRowStatement, UnsupportedShapeError> {
    let keys = descriptor.require_key(OperationKind::Update)?;
    let updatable = descriptor.updatable_columns();

    if updatable.is_empty() {
        return Err(UnsupportedShapeError::NothingToUpdate {
            entity: descriptor.entity.clone(),
            operation: OperationKind::Update,
        });
    }

    let set_clauses: Vec<String> = updatable
        .iter()
        .enumerate()
        .map(|(j, &i)| {
            let column = &descriptor.columns[i];
            format!("{} = {}", quote_identifier(&column.name), placeholder(j + 1, column.sql_type))
        })
        .collect();

    let outputs = descriptor.output_columns(OperationKind::Update);
    let predicate = build_key_predicate(descriptor, keys, updatable.len() + 1);

    Ok(SingleRowStatement {
        sql: format!(
            "UPDATE {} SET {}{}{}",
            descriptor.table,
            set_clauses.join(", "),
            build_where_clause(&[predicate]),
            returning(descriptor, &outputs)
        ),
        bound_columns: updatable.iter().chain(keys).copied().collect(),
        output_columns: outputs,
    })
}

/// `DELETE FROM t WHERE <keys>`
pub fn build_delete_one(
    descriptor: &RecordDescriptor,
) -> Result<SingleRowStatement, UnsupportedShapeError> {
    let keys = descriptor.require_key(OperationKind::Delete)?;

    Ok(SingleRowStatement {
        sql: format!(
            "DELETE FROM {}{}",
            descriptor.table,
            build_where_clause(&[build_key_predicate(descriptor, keys, 1)])
        ),
        bound_columns: keys.to_vec(),
        output_columns: Vec::new(),
    })
}

/// `SELECT 1 FROM t WHERE <keys>`
pub fn build_exists_one(
    descriptor: &RecordDescriptor,
) -> Result<SingleRowStatement, UnsupportedShapeError> {
    let keys = descriptor.require_key(OperationKind::Upsert)?;

    Ok(SingleRowStatement {
        sql: format!(
            "SELECT 1 FROM {}{}",
            descriptor.table,
            build_where_clause(&[build_key_predicate(descriptor, keys, 1)])
        ),
        bound_columns: keys.to_vec(),
        output_columns: Vec::new(),
    })
}
