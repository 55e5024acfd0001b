use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Error as PgError, NoTls, Row, Transaction};

use crate::database::executor::{BulkExecutor, Capabilities};
use crate::database::sql_value::{SqlType, SqlValue};

pub(crate) fn param_refs(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|param| param as &(dyn ToSql + Sync)).collect()
}

pub(crate) fn decode_rows(
    rows: Vec<Row>,
    column_types: &[SqlType],
) -> Result<Vec<Vec<SqlValue>>, PgError> {
    rows.iter()
        .map(|row| {
            column_types
                .iter()
                .enumerate()
                .map(|(idx, ty)| SqlValue::from_row(row, idx, *ty))
                .collect()
        })
        .collect()
}

// a bare connection is assumed to talk to a server with MERGE ... RETURNING
#[async_trait]
impl BulkExecutor for Client {
    type Error = PgError;

    fn capabilities(&self) -> Capabilities {
        Capabilities::bulk_merge()
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, PgError> {
        Client::execute(self, sql, &param_refs(params)).await
    }

    async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        column_types: &[SqlType],
    ) -> Result<Vec<Vec<SqlValue>>, PgError> {
        let rows = Client::query(self, sql, &param_refs(params)).await?;
        decode_rows(rows, column_types)
    }

    // sent over a plain connection, servers that only accept TLS refuse it;
    // PostgresClient cancels through its own connector
    async fn cancel(&self) -> Result<(), PgError> {
        self.cancel_token().cancel_query(NoTls).await
    }
}

#[async_trait]
impl BulkExecutor for Transaction<'_> {
    type Error = PgError;

    fn capabilities(&self) -> Capabilities {
        Capabilities::bulk_merge()
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, PgError> {
        Transaction::execute(self, sql, &param_refs(params)).await
    }

    async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        column_types: &[SqlType],
    ) -> Result<Vec<Vec<SqlValue>>, PgError> {
        let rows = Transaction::query(self, sql, &param_refs(params)).await?;
        decode_rows(rows, column_types)
    }

    async fn cancel(&self) -> Result<(), PgError> {
        self.cancel_token().cancel_query(NoTls).await
    }
}
