use crate::database::sql_value::SqlValue;
use crate::metadata::{RecordDescriptor, UnsupportedShapeError};
use crate::statement::query_builder::{placeholder, qualified, quote_identifier};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error(
        "Filter has no conditions, build it with Filter::match_all() to state that no extra predicate is intended"
    )]
    Ambiguous,

    #[error("{0}")]
    Shape(#[from] UnsupportedShapeError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(SqlValue),
    NotEq(SqlValue),
    Lt(SqlValue),
    Lte(SqlValue),
    Gt(SqlValue),
    Gte(SqlValue),
    In(Vec<SqlValue>),
    NotIn(Vec<SqlValue>),
    IsNull,
    IsNotNull,
    Like(String),
}

impl Predicate {
    fn parameter_count(&self) -> usize {
        match self {
            Predicate::In(values) | Predicate::NotIn(values) => values.len(),
            Predicate::IsNull | Predicate::IsNotNull => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub predicate: Predicate,
}

/// A conjunction of column predicates.
///
/// A filter without conditions is only valid when built with
/// [`Filter::match_all`]; rendering a plain empty filter fails with
/// [`FilterError::Ambiguous`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
    match_all: bool,
}

/// Rendered predicate plus the values bound to its placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicitly targets every row the statement would otherwise reach.
    pub fn match_all() -> Self {
        Self { conditions: Vec::new(), match_all: true }
    }

    pub fn condition(mut self, column: &str, predicate: Predicate) -> Self {
        self.conditions.push(Condition { column: column.to_string(), predicate });
        self
    }

    pub fn eq(self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.condition(column, Predicate::Eq(value.into()))
    }

    pub fn not_eq(self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.condition(column, Predicate::NotEq(value.into()))
    }

    pub fn lt(self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.condition(column, Predicate::Lt(value.into()))
    }

    pub fn lte(self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.condition(column, Predicate::Lte(value.into()))
    }

    pub fn gt(self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.condition(column, Predicate::Gt(value.into()))
    }

    pub fn gte(self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.condition(column, Predicate::Gte(value.into()))
    }

    pub fn is_in<V: Into<SqlValue>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.condition(column, Predicate::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn not_in<V: Into<SqlValue>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.condition(column, Predicate::NotIn(values.into_iter().map(Into::into).collect()))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.condition(column, Predicate::IsNull)
    }

    pub fn is_not_null(self, column: &str) -> Self {
        self.condition(column, Predicate::IsNotNull)
    }

    pub fn like(self, column: &str, pattern: impl Into<String>) -> Self {
        self.condition(column, Predicate::Like(pattern.into()))
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn is_match_all(&self) -> bool {
        self.match_all
    }

    pub fn parameter_count(&self) -> usize {
        self.conditions.iter().map(|c| c.predicate.parameter_count()).sum()
    }

    /// Renders the conditions against `alias` with placeholders starting at
    /// `first_param`. Returns `None` for an explicit match-all filter.
    pub fn render(
        &self,
        descriptor: &RecordDescriptor,
        alias: Option<&str>,
        first_param: usize,
    ) -> Result<Option<WhereFragment>, FilterError> {
        if self.conditions.is_empty() {
            return if self.match_all { Ok(None) } else { Err(FilterError::Ambiguous) };
        }

        let mut parts = Vec::with_capacity(self.conditions.len());
        let mut params = Vec::with_capacity(self.parameter_count());
        let mut next = first_param;

        for condition in &self.conditions {
            let column = descriptor
                .column(&condition.column)
                .ok_or_else(|| descriptor.unknown_column(&condition.column))?;

            let target = match alias {
                Some(alias) => qualified(alias, &column.name),
                None => quote_identifier(&column.name),
            };

            let mut bind = |value: &SqlValue| {
                let rendered = placeholder(next, column.sql_type);
                next += 1;
                params.push(value.clone());
                rendered
            };

            let part = match &condition.predicate {
                Predicate::Eq(value) => format!("{} = {}", target, bind(value)),
                Predicate::NotEq(value) => format!("{} <> {}", target, bind(value)),
                Predicate::Lt(value) => format!("{} < {}", target, bind(value)),
                Predicate::Lte(value) => format!("{} <= {}", target, bind(value)),
                Predicate::Gt(value) => format!("{} > {}", target, bind(value)),
                Predicate::Gte(value) => format!("{} >= {}", target, bind(value)),
                // an empty list matches nothing
                Predicate::In(values) if values.is_empty() => "FALSE".to_string(),
                Predicate::NotIn(values) if values.is_empty() => "TRUE".to_string(),
                Predicate::In(values) => {
                    let list: Vec<String> = values.iter().map(&mut bind).collect();
                    format!("{} IN ({})", target, list.join(", "))
                }
                Predicate::NotIn(values) => {
                    let list: Vec<String> = values.iter().map(&mut bind).collect();
                    format!("{} NOT IN ({})", target, list.join(", "))
                }
                Predicate::IsNull => format!("{} IS NULL", target),
                Predicate::IsNotNull => format!("{} IS NOT NULL", target),
                Predicate::Like(pattern) => {
                    format!("{} LIKE {}", target, bind(&SqlValue::Text(pattern.clone())))
                }
            };

            parts.push(part);
        }

        Ok(Some(WhereFragment { sql: parts.join(" AND "), params }))
    }
}
