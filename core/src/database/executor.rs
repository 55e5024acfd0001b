use std::error::Error as StdError;

use async_trait::async_trait;

use crate::database::sql_value::{SqlType, SqlValue};

/// What a backend can do, declared once when it is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// `MERGE ... RETURNING` with `merge_action()` and source column references.
    pub bulk_merge: bool,
}

impl Capabilities {
    pub fn bulk_merge() -> Self {
        Self { bulk_merge: true }
    }

    pub fn single_row() -> Self {
        Self { bulk_merge: false }
    }
}

/// The seam between statement generation and a live connection.
///
/// Implementations run exactly the SQL they are given with the parameters in
/// order, and decode every returned column with the matching entry of
/// `column_types`.
#[async_trait]
pub trait BulkExecutor: Send + Sync {
    type Error: StdError + Send + Sync + 'static;

    fn capabilities(&self) -> Capabilities;

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, Self::Error>;

    async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        column_types: &[SqlType],
    ) -> Result<Vec<Vec<SqlValue>>, Self::Error>;

    /// Asks the server to stop the statement currently running on this
    /// executor. Called after a statement was abandoned by cancellation or
    /// timeout; dropping the statement future alone leaves it running.
    async fn cancel(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}
