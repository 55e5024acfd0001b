use std::fmt;

use crate::database::sql_value::SqlValue;
use crate::metadata::{Entity, EntityError, FromSqlValue, RecordDescriptor, UnsupportedShapeError};
use crate::statement::{OperationKind, StatementTemplate};

/// Which MERGE branch produced an output row, as reported by `merge_action()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeAction {
    Insert,
    Update,
    Delete,
}

impl MergeAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "INSERT" => Some(MergeAction::Insert),
            "UPDATE" => Some(MergeAction::Update),
            "DELETE" => Some(MergeAction::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeAction::Insert => "INSERT",
            MergeAction::Update => "UPDATE",
            MergeAction::Delete => "DELETE",
        }
    }

    fn produced_by(&self, kind: OperationKind) -> bool {
        matches!(
            (kind, self),
            (OperationKind::Insert, MergeAction::Insert) |
                (OperationKind::Update, MergeAction::Update) |
                (OperationKind::Upsert, MergeAction::Insert | MergeAction::Update) |
                (OperationKind::Delete, MergeAction::Delete)
        )
    }
}

impl fmt::Display for MergeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum OutputCorrelationError {
    #[error("Expected {expected} output rows but the statement returned {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Output row carries ordinal {ordinal} outside 0..{batch_size}")]
    UnexpectedOrdinal { ordinal: i64, batch_size: usize },

    #[error("Ordinal {0} was reported more than once")]
    DuplicateOrdinal(usize),

    #[error("Output row ordinal is not an integer: {0}")]
    InvalidOrdinal(EntityError),

    #[error("Output row has {actual} columns, expected {expected}")]
    MalformedRow { expected: usize, actual: usize },

    #[error("Unknown merge action `{0}`")]
    UnknownAction(String),

    #[error("{action} is not produced by {operation}")]
    UnexpectedAction { action: MergeAction, operation: OperationKind },
}

/// Observed values for one record, keyed by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub ordinal: usize,
    pub action: MergeAction,
    pub values: Vec<(String, SqlValue)>,
}

impl OutputRow {
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values.iter().find(|(name, _)| name == column).map(|(_, value)| value)
    }

    /// Converts the value of `column` into a field type.
    pub fn get_as<V: FromSqlValue>(&self, column: &str) -> Result<V, EntityError> {
        let value =
            self.get(column).ok_or_else(|| EntityError::UnknownColumn(column.to_string()))?;
        V::from_sql_value(value.clone())
    }
}

/// Output values that were observed for a record of the input sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedOutput {
    /// Position of the record in the caller's input sequence.
    pub record_index: usize,
    pub action: MergeAction,
    pub values: Vec<(String, SqlValue)>,
}

type OutputCallback<T> = dyn Fn(&mut T, &OutputRow) -> Result<(), EntityError> + Send + Sync;

/// A typed callback copying observed output values onto a record.
///
/// The columns it reads are declared up front and checked against the
/// record's identity and computed columns when the map is built, and against
/// the output clause of the operation it is used with.
pub struct OutputMap<T> {
    columns: Vec<String>,
    callback: Box<OutputCallback<T>>,
}

impl<T: Entity> OutputMap<T> {
    pub fn new<F>(columns: &[&str], callback: F) -> Result<Self, UnsupportedShapeError>
    where
        F: Fn(&mut T, &OutputRow) -> Result<(), EntityError> + Send + Sync + 'static,
    {
        let descriptor = crate::metadata::resolve::<T>()?;

        for name in columns {
            let column = descriptor.column(name).ok_or_else(|| descriptor.unknown_column(name))?;
            if !column.is_output() {
                return Err(UnsupportedShapeError::InvalidColumnRole {
                    entity: descriptor.entity.clone(),
                    column: name.to_string(),
                    reason: "only identity and computed columns are reported back",
                });
            }
        }

        Ok(Self {
            columns: columns.iter().map(|name| name.to_string()).collect(),
            callback: Box::new(callback),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn check(
        &self,
        descriptor: &RecordDescriptor,
        kind: OperationKind,
    ) -> Result<(), UnsupportedShapeError> {
        let outputs = descriptor.output_columns(kind);

        for name in &self.columns {
            let reported =
                descriptor.column_index(name).map(|i| outputs.contains(&i)).unwrap_or(false);
            if !reported {
                return Err(UnsupportedShapeError::NotAnOutputColumn {
                    entity: descriptor.entity.clone(),
                    column: name.clone(),
                    operation: kind,
                });
            }
        }

        Ok(())
    }

    pub(crate) fn apply(&self, record: &mut T, row: &OutputRow) -> Result<(), EntityError> {
        (self.callback)(record, row)
    }
}

impl<T> fmt::Debug for OutputMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputMap").field("columns", &self.columns).finish_non_exhaustive()
    }
}

fn ordinal_of(value: &SqlValue, batch_size: usize) -> Result<usize, OutputCorrelationError> {
    let ordinal =
        i64::from_sql_value(value.clone()).map_err(OutputCorrelationError::InvalidOrdinal)?;

    usize::try_from(ordinal)
        .ok()
        .filter(|ordinal| *ordinal < batch_size)
        .ok_or(OutputCorrelationError::UnexpectedOrdinal { ordinal, batch_size })
}

/// Places the raw output rows of one batch by their returned ordinal.
///
/// Insert and upsert must report every ordinal of the batch exactly once.
/// Update only reports rows that matched, so a subset is accepted as long as
/// no ordinal repeats. Identity values are dropped from rows whose action is
/// `UPDATE`, the caller already holds that key.
pub fn correlate(
    descriptor: &RecordDescriptor,
    template: &StatementTemplate,
    rows: Vec<Vec<SqlValue>>,
) -> Result<Vec<OutputRow>, OutputCorrelationError> {
    let batch_size = template.batch_size;
    let requires_all = matches!(template.kind, OperationKind::Insert | OperationKind::Upsert);

    if (requires_all && rows.len() != batch_size) || rows.len() > batch_size {
        return Err(OutputCorrelationError::CountMismatch {
            expected: batch_size,
            actual: rows.len(),
        });
    }

    let width = 2 + template.output_columns.len();
    let mut slots: Vec<Option<OutputRow>> = vec![None; batch_size];

    for row in rows {
        if row.len() != width {
            return Err(OutputCorrelationError::MalformedRow { expected: width, actual: row.len() });
        }

        let mut values = row.into_iter();
        let ordinal = match values.next() {
            Some(value) => ordinal_of(&value, batch_size)?,
            None => return Err(OutputCorrelationError::MalformedRow { expected: width, actual: 0 }),
        };

        let action = match values.next() {
            Some(SqlValue::Text(action)) => {
                MergeAction::parse(&action).ok_or(OutputCorrelationError::UnknownAction(action))?
            }
            Some(other) => {
                return Err(OutputCorrelationError::UnknownAction(other.raw_name().to_string()))
            }
            None => return Err(OutputCorrelationError::MalformedRow { expected: width, actual: 1 }),
        };

        if !action.produced_by(template.kind) {
            return Err(OutputCorrelationError::UnexpectedAction {
                action,
                operation: template.kind,
            });
        }

        let values = template
            .output_columns
            .iter()
            .zip(values)
            // a matched row keeps the key the caller supplied
            .filter(|(i, _)| {
                let column = &descriptor.columns[**i];
                action != MergeAction::Update || !(column.is_identity() && column.is_key())
            })
            .map(|(&i, value)| (descriptor.columns[i].name.clone(), value))
            .collect();

        let slot = &mut slots[ordinal];
        if slot.is_some() {
            return Err(OutputCorrelationError::DuplicateOrdinal(ordinal));
        }
        *slot = Some(OutputRow { ordinal, action, values });
    }

    Ok(slots.into_iter().flatten().collect())
}
