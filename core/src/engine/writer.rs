use std::any::TypeId;
use std::sync::Arc;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batcher::Batcher;
use crate::config::{BulkConfig, OutputMapping};
use crate::database::executor::BulkExecutor;
use crate::database::sql_value::{SqlType, SqlValue};
use crate::engine::output::{correlate, AppliedOutput, MergeAction, OutputMap, OutputRow};
use crate::engine::BulkError;
use crate::metadata::{resolve, Entity, EntityError, RecordDescriptor, UnsupportedShapeError};
use crate::metrics::bulk::{self as metrics, status};
use crate::query::Filter;
use crate::statement::query_builder::TARGET_ALIAS;
use crate::statement::{bound_columns, build_template, cached_template, OperationKind, StatementTemplate};

/// One bulk write: the operation, the records it runs over and its options.
pub struct BulkRequest<'r, T> {
    pub kind: OperationKind,
    pub records: &'r mut [T],
    pub filter: Option<&'r Filter>,
    pub output_map: Option<&'r OutputMap<T>>,
    pub cancellation: Option<CancellationToken>,
}

impl<'r, T> BulkRequest<'r, T> {
    pub fn new(kind: OperationKind, records: &'r mut [T]) -> Self {
        Self { kind, records, filter: None, output_map: None, cancellation: None }
    }

    /// Extra predicate on the matched target rows. Update and delete only.
    pub fn with_filter(mut self, filter: &'r Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_output_map(mut self, output_map: &'r OutputMap<T>) -> Self {
        self.output_map = Some(output_map);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResult {
    /// Rows affected across all batches.
    pub affected: u64,
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    pub batches: usize,
    /// Output values observed per record, in input order.
    pub applied: Vec<AppliedOutput>,
}

impl BulkResult {
    fn count(&mut self, action: MergeAction, rows: u64) {
        self.affected += rows;
        match action {
            MergeAction::Insert => self.inserted += rows,
            MergeAction::Update => self.updated += rows,
            MergeAction::Delete => self.deleted += rows,
        }
    }
}

enum StatementOutput {
    Count(u64),
    Rows(Vec<Vec<SqlValue>>),
}

/// Runs bulk writes as a sequence of MERGE statements.
///
/// The writer never opens, commits or rolls back anything. Batches run one
/// after another on the executor the caller hands in; pass a transaction to
/// make the whole operation atomic. A failing batch stops the operation and
/// later batches are never sent. An empty record slice returns an empty
/// result before any validation or SQL.
#[derive(Debug, Clone, Default)]
pub struct BulkWriter {
    config: BulkConfig,
}

impl BulkWriter {
    pub fn new(config: BulkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    pub async fn insert<T: Entity, E: BulkExecutor>(
        &self,
        executor: &E,
        records: &mut [T],
    ) -> Result<BulkResult, BulkError> {
        self.execute(executor, BulkRequest::new(OperationKind::Insert, records)).await
    }

    pub async fn update<T: Entity, E: BulkExecutor>(
        &self,
        executor: &E,
        records: &mut [T],
    ) -> Result<BulkResult, BulkError> {
        self.execute(executor, BulkRequest::new(OperationKind::Update, records)).await
    }

    pub async fn upsert<T: Entity, E: BulkExecutor>(
        &self,
        executor: &E,
        records: &mut [T],
    ) -> Result<BulkResult, BulkError> {
        self.execute(executor, BulkRequest::new(OperationKind::Upsert, records)).await
    }

    pub async fn delete<T: Entity, E: BulkExecutor>(
        &self,
        executor: &E,
        records: &mut [T],
    ) -> Result<BulkResult, BulkError> {
        self.execute(executor, BulkRequest::new(OperationKind::Delete, records)).await
    }

    /// Updates the key-matched rows that also satisfy `filter`.
    pub async fn update_matching<T: Entity, E: BulkExecutor>(
        &self,
        executor: &E,
        records: &mut [T],
        filter: &Filter,
    ) -> Result<BulkResult, BulkError> {
        self.execute(executor, BulkRequest::new(OperationKind::Update, records).with_filter(filter))
            .await
    }

    /// Deletes the key-matched rows that also satisfy `filter`.
    pub async fn delete_matching<T: Entity, E: BulkExecutor>(
        &self,
        executor: &E,
        records: &mut [T],
        filter: &Filter,
    ) -> Result<BulkResult, BulkError> {
        self.execute(executor, BulkRequest::new(OperationKind::Delete, records).with_filter(filter))
            .await
    }

    pub async fn execute<T: Entity, E: BulkExecutor>(
        &self,
        executor: &E,
        request: BulkRequest<'_, T>,
    ) -> Result<BulkResult, BulkError> {
        let kind = request.kind;
        let result = self.run(executor, request).await;

        let outcome = match &result {
            Ok(_) => status::SUCCESS,
            Err(BulkError::Cancelled { .. }) | Err(BulkError::Timeout { .. }) => status::CANCELLED,
            Err(_) => status::ERROR,
        };
        metrics::record_operation(kind.as_str(), outcome);

        result
    }

    async fn run<T: Entity, E: BulkExecutor>(
        &self,
        executor: &E,
        request: BulkRequest<'_, T>,
    ) -> Result<BulkResult, BulkError> {
        let BulkRequest { kind, records, filter, output_map, cancellation } = request;

        if records.is_empty() {
            debug!("{}: no records, nothing to do", kind);
            return Ok(BulkResult::default());
        }

        if !executor.capabilities().bulk_merge {
            return Err(BulkError::MergeUnsupported);
        }

        let descriptor = resolve::<T>()?;
        let bound = bound_columns(&descriptor, kind)?;

        // validates the filter once, it is rendered again per batch with shifted placeholders
        let filter = match filter {
            Some(filter) => {
                if !kind.accepts_filter() {
                    return Err(UnsupportedShapeError::FilterNotSupported {
                        entity: descriptor.entity.clone(),
                        operation: kind,
                    }
                    .into());
                }
                filter.render(&descriptor, Some(TARGET_ALIAS), 1)?.map(|_| filter)
            }
            None => None,
        };

        if let Some(output_map) = output_map {
            output_map.check(&descriptor, kind)?;
        }

        let filter_parameters = filter.map(Filter::parameter_count).unwrap_or(0);
        let batcher =
            Batcher::new(bound.len(), self.config.max_parameters.saturating_sub(filter_parameters))?;

        let total = records.len();
        let batches = batcher.batch_count(total);
        info!(
            "{} {} records of {} into {} in {} batches of up to {}",
            kind,
            total,
            descriptor.entity,
            descriptor.table,
            batches,
            batcher.capacity()
        );

        let type_id = TypeId::of::<T>();
        let mut result = BulkResult::default();

        for batch in batcher.split_mut(records) {
            if cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
                return Err(BulkError::Cancelled { completed_batches: batch.index });
            }

            let size = batch.records.len();
            let record_parameters = size * bound.len();

            let fragment = match filter {
                Some(filter) => filter.render(&descriptor, Some(TARGET_ALIAS), record_parameters + 1)?,
                None => None,
            };

            let template = match &fragment {
                Some(fragment) => {
                    Arc::new(build_template(&descriptor, kind, size, Some(&fragment.sql))?)
                }
                None => cached_template(type_id, &descriptor, kind, size, batcher.capacity())?,
            };

            let mut params = Vec::with_capacity(record_parameters + filter_parameters);
            for (ordinal, record) in batch.records.iter().enumerate() {
                bind_record(&descriptor, &template, record, &mut params)
                    .map_err(|source| BulkError::Entity { record_index: batch.offset + ordinal, source })?;
            }
            if let Some(fragment) = fragment {
                params.extend(fragment.params);
            }

            if self.config.log_statements {
                debug!("{} batch {}/{} query:\n{}", kind, batch.index + 1, batches, template.sql);
            }

            let timer = metrics::time_statement(kind.as_str());
            let output = self
                .run_statement(executor, &descriptor, &template, &params, cancellation.as_ref(), batch.index)
                .await;
            timer.stop();

            let output = match output {
                Ok(output) => {
                    metrics::record_statement(kind.as_str(), size, true);
                    output
                }
                Err(e) => {
                    metrics::record_statement(kind.as_str(), size, false);
                    if matches!(e, BulkError::Execution { .. }) {
                        error!("{} - Batch {} failed: {}", descriptor.entity, batch.index, e);
                        error!("Failed query:\n{}", template.sql);
                    }
                    return Err(e);
                }
            };

            let (inserted_before, updated_before, deleted_before) =
                (result.inserted, result.updated, result.deleted);

            match output {
                StatementOutput::Count(count) => {
                    let action = match kind {
                        OperationKind::Insert => MergeAction::Insert,
                        OperationKind::Update | OperationKind::Upsert => MergeAction::Update,
                        OperationKind::Delete => MergeAction::Delete,
                    };
                    result.count(action, count);
                }
                StatementOutput::Rows(rows) => {
                    let outputs = correlate(&descriptor, &template, rows)
                        .map_err(|source| BulkError::OutputCorrelation { batch: batch.index, source })?;

                    for row in outputs {
                        let record_index = batch.offset + row.ordinal;
                        self.apply_output(&mut batch.records[row.ordinal], &row, output_map)
                            .map_err(|source| BulkError::Entity { record_index, source })?;

                        result.count(row.action, 1);
                        result.applied.push(AppliedOutput {
                            record_index,
                            action: row.action,
                            values: row.values,
                        });
                    }
                }
            }

            metrics::record_rows(
                kind.as_str(),
                result.inserted - inserted_before,
                result.updated - updated_before,
                result.deleted - deleted_before,
            );
            result.batches += 1;
        }

        info!(
            "{} {} finished: {} affected ({} inserted, {} updated, {} deleted) in {} batches",
            kind,
            descriptor.entity,
            result.affected,
            result.inserted,
            result.updated,
            result.deleted,
            result.batches
        );

        Ok(result)
    }

    async fn run_statement<E: BulkExecutor>(
        &self,
        executor: &E,
        descriptor: &RecordDescriptor,
        template: &StatementTemplate,
        params: &[SqlValue],
        cancellation: Option<&CancellationToken>,
        batch: usize,
    ) -> Result<StatementOutput, BulkError> {
        let statement = async {
            let output = if template.returns_rows {
                let mut column_types = vec![SqlType::Integer, SqlType::Text];
                column_types
                    .extend(template.output_columns.iter().map(|&i| descriptor.columns[i].sql_type));

                executor.query(&template.sql, params, &column_types).await.map(StatementOutput::Rows)
            } else {
                executor.execute(&template.sql, params).await.map(StatementOutput::Count)
            };

            output.map_err(|e| BulkError::Execution { batch, source: Box::new(e) })
        };

        let limited = async {
            match self.config.statement_timeout() {
                Some(limit) => match timeout(limit, statement).await {
                    Ok(output) => output,
                    Err(_) => Err(BulkError::Timeout { batch, limit }),
                },
                None => statement.await,
            }
        };

        let output = match cancellation {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(BulkError::Cancelled { completed_batches: batch }),
                output = limited => output,
            },
            None => limited.await,
        };

        if let Err(e @ (BulkError::Cancelled { .. } | BulkError::Timeout { .. })) = &output {
            warn!("{} - Batch {} abandoned: {}", descriptor.entity, batch, e);
            if let Err(e) = executor.cancel().await {
                warn!("{} - Could not cancel batch {} on the server: {}", descriptor.entity, batch, e);
            }
        }

        output
    }

    pub(crate) fn apply_output<T: Entity>(
        &self,
        record: &mut T,
        row: &OutputRow,
        output_map: Option<&OutputMap<T>>,
    ) -> Result<(), EntityError> {
        match (output_map, self.config.output_mapping) {
            (Some(output_map), _) => output_map.apply(record, row),
            (None, OutputMapping::ByName) => {
                for (column, value) in &row.values {
                    record.apply(column, value.clone())?;
                }
                Ok(())
            }
            (None, OutputMapping::CallbackOnly) => Ok(()),
        }
    }
}

fn bind_record<T: Entity>(
    descriptor: &RecordDescriptor,
    template: &StatementTemplate,
    record: &T,
    params: &mut Vec<SqlValue>,
) -> Result<(), EntityError> {
    for &i in &template.bound_columns {
        let name = &descriptor.columns[i].name;
        let value = record.value(name).ok_or_else(|| EntityError::UnknownColumn(name.clone()))?;
        params.push(value);
    }
    Ok(())
}
