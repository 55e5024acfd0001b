use std::marker::PhantomData;

use tracing::{debug, info};

use crate::config::BulkConfig;
use crate::database::executor::BulkExecutor;
use crate::database::sql_value::{SqlType, SqlValue};
use crate::engine::{
    AppliedOutput, BulkError, BulkRequest, BulkResult, BulkWriter, MergeAction,
    OutputCorrelationError, OutputRow,
};
use crate::metadata::{resolve, Entity, EntityError, RecordDescriptor};
use crate::query::{build_delete_where, build_select_where, build_update_where, Assignments, Filter};
use crate::statement::single_row::{
    build_delete_one, build_exists_one, build_insert_one, build_update_one, SingleRowStatement,
};
use crate::statement::{bound_columns, OperationKind};

/// Typed entry point over one record type.
///
/// Writes take the bulk MERGE path when the executor declares it and fall back
/// to one statement per record otherwise. Both paths report the same
/// [`BulkResult`], with `batches` counting the statements that were sent.
pub struct Repository<T> {
    writer: BulkWriter,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Default for Repository<T> {
    fn default() -> Self {
        Self::new(BulkConfig::default())
    }
}

impl<T: Entity> Repository<T> {
    pub fn new(config: BulkConfig) -> Self {
        Self { writer: BulkWriter::new(config), _entity: PhantomData }
    }

    pub fn writer(&self) -> &BulkWriter {
        &self.writer
    }

    pub async fn insert<E: BulkExecutor>(
        &self,
        executor: &E,
        records: &mut [T],
    ) -> Result<BulkResult, BulkError> {
        self.write(executor, OperationKind::Insert, records).await
    }

    pub async fn update<E: BulkExecutor>(
        &self,
        executor: &E,
        records: &mut [T],
    ) -> Result<BulkResult, BulkError> {
        self.write(executor, OperationKind::Update, records).await
    }

    pub async fn upsert<E: BulkExecutor>(
        &self,
        executor: &E,
        records: &mut [T],
    ) -> Result<BulkResult, BulkError> {
        self.write(executor, OperationKind::Upsert, records).await
    }

    pub async fn delete<E: BulkExecutor>(
        &self,
        executor: &E,
        records: &mut [T],
    ) -> Result<BulkResult, BulkError> {
        self.write(executor, OperationKind::Delete, records).await
    }

    /// Reads every row matching `filter` into fresh records.
    pub async fn find_where<E: BulkExecutor>(
        &self,
        executor: &E,
        filter: &Filter,
    ) -> Result<Vec<T>, BulkError>
    where
        T: Default,
    {
        let descriptor = resolve::<T>()?;
        let statement = build_select_where(&descriptor, filter)?;
        let column_types = column_types(&descriptor, &statement.output_columns);

        debug!("Select query: {}", statement.sql);

        let rows = executor
            .query(&statement.sql, &statement.params, &column_types)
            .await
            .map_err(|e| BulkError::Execution { batch: 0, source: Box::new(e) })?;

        rows.into_iter()
            .enumerate()
            .map(|(record_index, row)| {
                let mut record = T::default();
                for (&i, value) in statement.output_columns.iter().zip(row) {
                    record
                        .apply(&descriptor.columns[i].name, value)
                        .map_err(|source| BulkError::Entity { record_index, source })?;
                }
                Ok(record)
            })
            .collect()
    }

    /// `UPDATE ... SET <assignments> WHERE <filter>`, returns the affected row count.
    pub async fn update_where<E: BulkExecutor>(
        &self,
        executor: &E,
        assignments: &Assignments,
        filter: &Filter,
    ) -> Result<u64, BulkError> {
        let descriptor = resolve::<T>()?;
        let statement = build_update_where(&descriptor, assignments, filter)?;

        debug!("Update query: {}", statement.sql);

        executor
            .execute(&statement.sql, &statement.params)
            .await
            .map_err(|e| BulkError::Execution { batch: 0, source: Box::new(e) })
    }

    /// `DELETE FROM ... WHERE <filter>`, returns the affected row count.
    pub async fn delete_where<E: BulkExecutor>(
        &self,
        executor: &E,
        filter: &Filter,
    ) -> Result<u64, BulkError> {
        let descriptor = resolve::<T>()?;
        let statement = build_delete_where(&descriptor, filter)?;

        debug!("Delete query: {}", statement.sql);

        executor
            .execute(&statement.sql, &statement.params)
            .await
            .map_err(|e| BulkError::Execution { batch: 0, source: Box::new(e) })
    }

    async fn write<E: BulkExecutor>(
        &self,
        executor: &E,
        kind: OperationKind,
        records: &mut [T],
    ) -> Result<BulkResult, BulkError> {
        if executor.capabilities().bulk_merge {
            return self.writer.execute(executor, BulkRequest::new(kind, records)).await;
        }

        let descriptor = resolve::<T>()?;
        // same shape checks as the bulk path
        bound_columns(&descriptor, kind)?;

        if records.is_empty() {
            return Ok(BulkResult::default());
        }

        info!("{} {} records of {} one statement at a time", kind, records.len(), descriptor.entity);

        let mut writes =
            SingleRowWrites { repository: self, executor, descriptor: &descriptor, record_index: 0 };
        let mut result = BulkResult::default();

        for (record_index, record) in records.iter_mut().enumerate() {
            writes.record_index = record_index;
            let statements_before = result.batches;
            let outcome = match kind {
                OperationKind::Insert => writes.insert(record, &mut result).await,
                OperationKind::Update => writes.update(record, &mut result).await.map(|_| ()),
                OperationKind::Upsert => writes.upsert(record, &mut result).await,
                OperationKind::Delete => writes.delete(record, &mut result).await,
            };

            outcome.map_err(|e| match e {
                SingleRowError::Bulk(e) => e,
                SingleRowError::Entity(source) => BulkError::Entity { record_index, source },
                SingleRowError::Correlation(source) => {
                    BulkError::OutputCorrelation { batch: statements_before, source }
                }
            })?;
        }

        Ok(result)
    }
}

fn column_types(descriptor: &RecordDescriptor, columns: &[usize]) -> Vec<SqlType> {
    columns.iter().map(|&i| descriptor.columns[i].sql_type).collect()
}

fn bind(
    descriptor: &RecordDescriptor,
    statement: &SingleRowStatement,
    record: &impl Entity,
) -> Result<Vec<SqlValue>, EntityError> {
    statement
        .bound_columns
        .iter()
        .map(|&i| {
            let name = &descriptor.columns[i].name;
            record.value(name).ok_or_else(|| EntityError::UnknownColumn(name.clone()))
        })
        .collect()
}

enum SingleRowError {
    Bulk(BulkError),
    Entity(EntityError),
    Correlation(OutputCorrelationError),
}

impl From<EntityError> for SingleRowError {
    fn from(error: EntityError) -> Self {
        SingleRowError::Entity(error)
    }
}

impl From<BulkError> for SingleRowError {
    fn from(error: BulkError) -> Self {
        SingleRowError::Bulk(error)
    }
}

struct SingleRowWrites<'a, T, E> {
    repository: &'a Repository<T>,
    executor: &'a E,
    descriptor: &'a RecordDescriptor,
    record_index: usize,
}

impl<T: Entity, E: BulkExecutor> SingleRowWrites<'_, T, E> {
    /// Runs one statement and returns either its row count or its output rows.
    async fn run(
        &self,
        statement: &SingleRowStatement,
        record: &T,
        result: &mut BulkResult,
    ) -> Result<(u64, Vec<Vec<SqlValue>>), SingleRowError> {
        let params = bind(self.descriptor, statement, record)?;
        let batch = result.batches;
        result.batches += 1;

        let outcome = if statement.output_columns.is_empty() {
            self.executor.execute(&statement.sql, &params).await.map(|count| (count, Vec::new()))
        } else {
            let column_types = column_types(self.descriptor, &statement.output_columns);
            self.executor
                .query(&statement.sql, &params, &column_types)
                .await
                .map(|rows| (rows.len() as u64, rows))
        };

        outcome.map_err(|e| BulkError::Execution { batch, source: Box::new(e) }.into())
    }

    fn apply(
        &self,
        statement: &SingleRowStatement,
        record: &mut T,
        action: MergeAction,
        rows: Vec<Vec<SqlValue>>,
        result: &mut BulkResult,
    ) -> Result<(), SingleRowError> {
        if rows.len() > 1 {
            return Err(SingleRowError::Correlation(OutputCorrelationError::CountMismatch {
                expected: 1,
                actual: rows.len(),
            }));
        }

        for row in rows {
            let values: Vec<(String, SqlValue)> = statement
                .output_columns
                .iter()
                .map(|&i| self.descriptor.columns[i].name.clone())
                .zip(row)
                .collect();
            let row = OutputRow { ordinal: 0, action, values };

            self.repository.writer.apply_output(record, &row, None)?;
            result.applied.push(AppliedOutput {
                record_index: self.record_index,
                action,
                values: row.values,
            });
        }

        Ok(())
    }

    async fn insert(&mut self, record: &mut T, result: &mut BulkResult) -> Result<(), SingleRowError> {
        let statement = build_insert_one(self.descriptor);
        let (count, rows) = self.run(&statement, record, result).await?;

        if !statement.output_columns.is_empty() && rows.len() != 1 {
            return Err(SingleRowError::Correlation(OutputCorrelationError::CountMismatch {
                expected: 1,
                actual: rows.len(),
            }));
        }

        self.apply(&statement, record, MergeAction::Insert, rows, result)?;
        result.affected += count;
        result.inserted += count;
        Ok(())
    }

    /// Returns how many rows matched the key.
    async fn update(&mut self, record: &mut T, result: &mut BulkResult) -> Result<u64, SingleRowError> {
        let statement = build_update_one(self.descriptor).map_err(BulkError::from)?;
        let (count, rows) = self.run(&statement, record, result).await?;

        self.apply(&statement, record, MergeAction::Update, rows, result)?;
        result.affected += count;
        result.updated += count;
        Ok(count)
    }

    async fn upsert(&mut self, record: &mut T, result: &mut BulkResult) -> Result<(), SingleRowError> {
        let matched = if self.descriptor.updatable_columns().is_empty() {
            // nothing to change on a match, only check whether the key exists; a
            // match counts as updated like the self assigning MERGE branch does
            let statement = build_exists_one(self.descriptor).map_err(BulkError::from)?;
            let (count, _) = self.run(&statement, record, result).await?;
            result.affected += count;
            result.updated += count;
            count
        } else {
            self.update(record, result).await?
        };

        if matched == 0 {
            self.insert(record, result).await?;
        }

        Ok(())
    }

    async fn delete(&mut self, record: &mut T, result: &mut BulkResult) -> Result<(), SingleRowError> {
        let statement = build_delete_one(self.descriptor).map_err(BulkError::from)?;
        let (count, _) = self.run(&statement, record, result).await?;

        result.affected += count;
        result.deleted += count;
        Ok(())
    }
}
