//! Bulk insert, update, upsert and delete for typed records over PostgreSQL `MERGE`.
//!
//! Records describe their table through [`Entity`] (usually via [`impl_entity!`]).
//! [`BulkWriter`] splits a record slice into batches that fit the bound-parameter
//! limit, runs one `MERGE` per batch on the executor it is given and copies
//! generated values back onto the records.

// public
pub mod metrics;
pub mod statement;

mod batcher;
pub use batcher::{Batch, Batcher, RecordTooWideError};

mod config;
pub use config::{connection_string, BulkConfig, OutputMapping, DEFAULT_MAX_PARAMETERS};

mod database;
pub use database::{
    executor::{BulkExecutor, Capabilities},
    postgres::{PostgresClient, PostgresConnectionError, PostgresError},
    sql_value::{SqlType, SqlValue},
};

mod engine;
pub use engine::{
    correlate, AppliedOutput, BulkError, BulkRequest, BulkResult, BulkWriter, MergeAction,
    OutputCorrelationError, OutputMap, OutputRow,
};

mod logger;
pub use logger::{setup_info_logger, setup_logger, setup_statement_logger};

mod metadata;
pub use metadata::{
    resolve, ColumnDescriptor, Entity, EntityError, EntitySchema, FromSqlValue, Generated,
    KeyRole, RecordDescriptor, UnsupportedShapeError,
};

mod query;
pub use query::{
    build_delete_where, build_select_where, build_update_where, Assignments, Condition, Filter,
    FilterError, FilteredStatement, Predicate, WhereFragment,
};

mod repository;
pub use repository::Repository;

#[cfg(test)]
pub(crate) mod test_support;

// export 3rd party dependencies
pub use async_trait::async_trait;
pub use tokio_postgres::types::Type as PgType;
pub use tokio_util::sync::CancellationToken;
