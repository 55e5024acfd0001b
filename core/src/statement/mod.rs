//! SQL generation for the bulk MERGE statements and their single-row fallbacks.

pub mod query_builder;
pub mod single_row;
mod template;

pub use template::{bound_columns, build_template, cached_template, OperationKind, StatementTemplate};
