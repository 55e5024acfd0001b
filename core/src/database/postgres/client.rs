use std::{env, time::Duration};

use async_trait::async_trait;
use bb8::{Pool, PooledConnection, RunError};
use bb8_postgres::PostgresConnectionManager;
use futures::future::BoxFuture;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio::{runtime::Handle, task, time::timeout};
use tokio_postgres::{config::SslMode, CancelToken, Client, Config, Error as PgError, Transaction};
use tracing::{debug, error, info, warn};

use crate::config::connection_string;
use crate::database::executor::{BulkExecutor, Capabilities};
use crate::database::postgres::executor::{decode_rows, param_refs};
use crate::database::sql_value::{SqlType, SqlValue};
use crate::metrics::bulk::set_pool_connections;

/// First server version whose MERGE supports RETURNING and `merge_action()`.
const MERGE_RETURNING_VERSION: i32 = 170000;

#[derive(thiserror::Error, Debug)]
pub enum PostgresConnectionError {
    #[error("The database connection string is wrong please check your environment: {0}")]
    DatabaseConnectionConfigWrong(#[from] env::VarError),

    #[error("Connection pool error: {0}")]
    ConnectionPoolError(#[from] tokio_postgres::Error),

    #[error("Connection pool runtime error: {0}")]
    ConnectionPoolRuntimeError(#[from] RunError<tokio_postgres::Error>),

    #[error("Can not connect to the database please make sure your connection string is correct")]
    CanNotConnectToDatabase,

    #[error("Could not parse connection string make sure it is correctly formatted")]
    CouldNotParseConnectionString,

    #[error("Could not create tls connector")]
    CouldNotCreateTlsConnector,
}

#[derive(thiserror::Error, Debug)]
pub enum PostgresError {
    #[error("PgError {0}")]
    PgError(#[from] PgError),

    #[error("Connection pool error: {0}")]
    ConnectionPoolError(#[from] RunError<tokio_postgres::Error>),
}

type Manager = PostgresConnectionManager<MakeTlsConnector>;

/// Pooled PostgreSQL backend. Whether bulk MERGE is available is decided from
/// the server version when the pool is created.
pub struct PostgresClient {
    pool: Pool<Manager>,
    tls: MakeTlsConnector,
    capabilities: Capabilities,
}

impl PostgresClient {
    /// Connects using `DATABASE_URL` from the environment (or a `.env` file).
    pub async fn new() -> Result<Self, PostgresConnectionError> {
        let connection_str = connection_string()?;
        Self::connect(&connection_str).await
    }

    pub async fn connect(connection_str: &str) -> Result<Self, PostgresConnectionError> {
        async fn _connect(
            connection_str: &str,
            disable_ssl: bool,
        ) -> Result<PostgresClient, PostgresConnectionError> {
            let mut config: Config = connection_str
                .parse()
                .map_err(|_| PostgresConnectionError::CouldNotParseConnectionString)?;

            if disable_ssl {
                config.ssl_mode(SslMode::Disable);
            }

            let connector = TlsConnector::builder()
                .build()
                .map_err(|_| PostgresConnectionError::CouldNotCreateTlsConnector)?;
            let tls_connector = MakeTlsConnector::new(connector);

            let (client, connection) =
                match timeout(Duration::from_millis(5000), config.connect(tls_connector.clone()))
                    .await
                {
                    Ok(Ok((client, connection))) => (client, connection),
                    Ok(Err(e)) => {
                        // retry without ssl if ssl has been attempted and failed
                        if !disable_ssl &&
                            config.get_ssl_mode() != SslMode::Disable &&
                            !connection_str.contains("sslmode=require")
                        {
                            return Box::pin(_connect(connection_str, true)).await;
                        }
                        error!("Error connecting to database: {}", e);
                        return Err(PostgresConnectionError::CanNotConnectToDatabase);
                    }
                    Err(e) => {
                        error!("Timeout connecting to database: {}", e);
                        return Err(PostgresConnectionError::CanNotConnectToDatabase);
                    }
                };

            let connection_handle = task::spawn(connection);

            let version: i32 = match client
                .query_one("SELECT current_setting('server_version_num')::int", &[])
                .await
            {
                Ok(row) => row.try_get(0)?,
                Err(_) => return Err(PostgresConnectionError::CanNotConnectToDatabase),
            };

            drop(client);
            match connection_handle.await {
                Ok(Ok(())) => (),
                Ok(Err(_)) => return Err(PostgresConnectionError::CanNotConnectToDatabase),
                Err(_) => return Err(PostgresConnectionError::CanNotConnectToDatabase),
            }

            let capabilities = if version >= MERGE_RETURNING_VERSION {
                Capabilities::bulk_merge()
            } else {
                Capabilities::single_row()
            };

            info!(
                "Connected to PostgreSQL server version {} (bulk merge: {})",
                version, capabilities.bulk_merge
            );

            let manager = PostgresConnectionManager::new(config, tls_connector.clone());
            let pool = Pool::builder().build(manager).await?;

            Ok(PostgresClient { pool, tls: tls_connector, capabilities })
        }

        _connect(connection_str, false).await
    }

    /// Overrides the detected capabilities, e.g. to force the single-row path.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    async fn get(&self) -> Result<PooledConnection<'_, Manager>, PostgresError> {
        let conn = self.pool.get().await?;
        let state = self.pool.state();
        set_pool_connections(state.connections - state.idle_connections, state.idle_connections);
        Ok(conn)
    }

    fn running(&self, conn: &Client) -> RunningStatement {
        RunningStatement { token: Some(conn.cancel_token()), tls: self.tls.clone() }
    }

    pub async fn batch_execute(&self, sql: &str) -> Result<(), PostgresError> {
        let conn = self.get().await?;
        conn.batch_execute(sql).await.map_err(PostgresError::PgError)
    }

    /// Runs `f` inside one transaction, committing only when it succeeds. The
    /// transaction is itself a [`BulkExecutor`], so every batch written through it
    /// becomes visible atomically.
    pub async fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t Transaction<'t>) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: From<PostgresError>,
    {
        let mut conn = self.get().await?;
        let transaction = conn.transaction().await.map_err(PostgresError::PgError)?;

        let result = f(&transaction).await?;

        transaction.commit().await.map_err(PostgresError::PgError)?;

        Ok(result)
    }
}

#[async_trait]
impl BulkExecutor for PostgresClient {
    type Error = PostgresError;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, PostgresError> {
        let conn = self.get().await?;
        let running = self.running(&conn);
        let count = conn.execute(sql, &param_refs(params)).await;
        running.finish();

        let count = count?;
        debug!("Statement affected {} rows", count);
        Ok(count)
    }

    async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        column_types: &[SqlType],
    ) -> Result<Vec<Vec<SqlValue>>, PostgresError> {
        let conn = self.get().await?;
        let running = self.running(&conn);
        let rows = conn.query(sql, &param_refs(params)).await;
        running.finish();

        Ok(decode_rows(rows?, column_types)?)
    }
}

/// Cancels the statement on its pooled connection when dropped before
/// [`RunningStatement::finish`], i.e. when the caller abandoned the future.
/// The connection goes back to the pool right away, so the statement is
/// stopped here rather than through [`BulkExecutor::cancel`].
struct RunningStatement {
    token: Option<CancelToken>,
    tls: MakeTlsConnector,
}

impl RunningStatement {
    fn finish(mut self) {
        self.token = None;
    }
}

impl Drop for RunningStatement {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };

        let Ok(handle) = Handle::try_current() else {
            warn!("No runtime to cancel an abandoned statement on");
            return;
        };

        let tls = self.tls.clone();
        handle.spawn(async move {
            if let Err(e) = token.cancel_query(tls).await {
                warn!("Could not cancel abandoned statement: {}", e);
            } else {
                debug!("Cancelled abandoned statement");
            }
        });
    }
}
