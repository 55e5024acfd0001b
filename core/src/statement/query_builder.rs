//! Shared SQL fragment building for the MERGE templates, the single-row
//! statements and the filter-driven statements.

use crate::database::sql_value::SqlType;
use crate::metadata::RecordDescriptor;

/// Alias of the persisted table in every generated statement.
pub const TARGET_ALIAS: &str = "t";

/// Alias of the VALUES pseudo-table feeding a MERGE.
pub const SOURCE_ALIAS: &str = "s";

/// Column carrying the per-batch ordinal of each source row.
pub const ORDINAL_COLUMN: &str = "__ordinal";

/// Quotes an identifier, doubling embedded quotes.
#[inline]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Formats a table name, handling `schema.table` format.
pub fn format_table_name(table_name: &str) -> String {
    table_name
        .split('.')
        .map(|part| quote_identifier(part.trim().trim_matches('"')))
        .collect::<Vec<_>>()
        .join(".")
}

/// `alias."column"`
pub fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", alias, quote_identifier(column))
}

pub fn placeholder(index: usize, sql_type: SqlType) -> String {
    format!("${}::{}", index, sql_type.as_str())
}

pub fn column_list(descriptor: &RecordDescriptor, columns: &[usize]) -> String {
    columns
        .iter()
        .map(|&i| quote_identifier(&descriptor.columns[i].name))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn qualified_column_list(descriptor: &RecordDescriptor, alias: &str, columns: &[usize]) -> String {
    columns
        .iter()
        .map(|&i| qualified(alias, &descriptor.columns[i].name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds the MERGE source:
///
/// ```sql
/// (VALUES (0, $1::BIGINT, $2::TEXT), (1, $3::BIGINT, $4::TEXT)) AS s ("__ordinal", "id", "name")
/// ```
///
/// Ordinals are literals so they cost no bound parameter.
pub fn build_values_source(descriptor: &RecordDescriptor, bound: &[usize], rows: usize) -> String {
    let mut values = Vec::with_capacity(rows);

    for ordinal in 0..rows {
        let base = ordinal * bound.len() + 1;
        let mut row = vec![ordinal.to_string()];
        row.extend(
            bound
                .iter()
                .enumerate()
                .map(|(j, &column)| placeholder(base + j, descriptor.columns[column].sql_type)),
        );
        values.push(format!("({})", row.join(", ")));
    }

    let mut header = vec![quote_identifier(ORDINAL_COLUMN)];
    header.extend(bound.iter().map(|&i| quote_identifier(&descriptor.columns[i].name)));

    format!(
        "(VALUES\n    {}\n) AS {} ({})",
        values.join(",\n    "),
        SOURCE_ALIAS,
        header.join(", ")
    )
}

/// Builds the key join: `t."a" = s."a" AND t."b" = s."b"`.
pub fn build_key_join(
    descriptor: &RecordDescriptor,
    left_alias: &str,
    right_alias: &str,
    keys: &[usize],
) -> String {
    keys.iter()
        .map(|&i| {
            let name = &descriptor.columns[i].name;
            format!("{} = {}", qualified(left_alias, name), qualified(right_alias, name))
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Builds a key predicate against numbered parameters: `"a" = $1::BIGINT AND "b" = $2::TEXT`.
pub fn build_key_predicate(descriptor: &RecordDescriptor, keys: &[usize], first_param: usize) -> String {
    keys.iter()
        .enumerate()
        .map(|(j, &i)| {
            let column = &descriptor.columns[i];
            format!(
                "{} = {}",
                quote_identifier(&column.name),
                placeholder(first_param + j, column.sql_type)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Builds a SET clause taking the value from the source row: `"name" = s."name"`.
pub fn build_set_clause(column: &str) -> String {
    format!("{} = {}", quote_identifier(column), qualified(SOURCE_ALIAS, column))
}

/// Builds the complete WHERE clause from conditions.
pub fn build_where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("\nWHERE {}", conditions.join("\n  AND "))
    }
}

/// Builds `RETURNING a, b` or nothing when there is nothing to return.
pub fn build_returning(items: &[String]) -> String {
    if items.is_empty() {
        String::new()
    } else {
        format!("\nRETURNING {}", items.join(", "))
    }
}
