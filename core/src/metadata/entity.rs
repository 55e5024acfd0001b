use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::database::sql_value::SqlValue;
use crate::metadata::schema::EntitySchema;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EntityError {
    #[error("Entity has no column named `{0}`")]
    UnknownColumn(String),

    #[error("Expected a {expected} value but got {found}")]
    TypeMismatch { expected: &'static str, found: &'static str },

    #[error("Column value is NULL but the field is not optional")]
    UnexpectedNull,

    #[error("Value {value} does not fit into {target}")]
    OutOfRange { value: i64, target: &'static str },

    #[error("{0}")]
    Custom(String),
}

/// A record type the bulk writer can persist.
///
/// `schema` is called once per type and the result is cached for the lifetime
/// of the process, so it must always describe the same columns in the same order.
/// `value` reads a column by name for parameter binding and `apply` writes an
/// observed output value back by name.
///
/// Most types implement this through [`impl_entity!`](crate::impl_entity).
pub trait Entity: Send + Sync + 'static {
    fn schema() -> EntitySchema;

    fn value(&self, column: &str) -> Option<SqlValue>;

    fn apply(&mut self, column: &str, value: SqlValue) -> Result<(), EntityError>;
}

/// Conversion from a decoded [`SqlValue`] into a record field.
pub trait FromSqlValue: Sized {
    fn from_sql_value(value: SqlValue) -> Result<Self, EntityError>;
}

fn mismatch<T>(expected: &'static str, value: &SqlValue) -> Result<T, EntityError> {
    match value {
        SqlValue::Null => Err(EntityError::UnexpectedNull),
        other => Err(EntityError::TypeMismatch { expected, found: other.raw_name() }),
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: SqlValue) -> Result<Self, EntityError> {
        match value {
            SqlValue::Bool(value) => Ok(value),
            other => mismatch("Bool", &other),
        }
    }
}

impl FromSqlValue for i16 {
    fn from_sql_value(value: SqlValue) -> Result<Self, EntityError> {
        match value {
            SqlValue::SmallInt(value) => Ok(value),
            SqlValue::Integer(value) => i16::try_from(value)
                .map_err(|_| EntityError::OutOfRange { value: value.into(), target: "i16" }),
            SqlValue::BigInt(value) => i16::try_from(value)
                .map_err(|_| EntityError::OutOfRange { value, target: "i16" }),
            other => mismatch("SmallInt", &other),
        }
    }
}

impl FromSqlValue for i32 {
    fn from_sql_value(value: SqlValue) -> Result<Self, EntityError> {
        match value {
            SqlValue::SmallInt(value) => Ok(value.into()),
            SqlValue::Integer(value) => Ok(value),
            SqlValue::BigInt(value) => i32::try_from(value)
                .map_err(|_| EntityError::OutOfRange { value, target: "i32" }),
            other => mismatch("Integer", &other),
        }
    }
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: SqlValue) -> Result<Self, EntityError> {
        match value {
            SqlValue::SmallInt(value) => Ok(value.into()),
            SqlValue::Integer(value) => Ok(value.into()),
            SqlValue::BigInt(value) => Ok(value),
            other => mismatch("BigInt", &other),
        }
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: SqlValue) -> Result<Self, EntityError> {
        match value {
            SqlValue::Double(value) => Ok(value),
            other => mismatch("Double", &other),
        }
    }
}

impl FromSqlValue for Decimal {
    fn from_sql_value(value: SqlValue) -> Result<Self, EntityError> {
        match value {
            SqlValue::Numeric(value) => Ok(value),
            SqlValue::SmallInt(value) => Ok(value.into()),
            SqlValue::Integer(value) => Ok(value.into()),
            SqlValue::BigInt(value) => Ok(value.into()),
            other => mismatch("Numeric", &other),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: SqlValue) -> Result<Self, EntityError> {
        match value {
            SqlValue::Text(value) => Ok(value),
            other => mismatch("Text", &other),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: SqlValue) -> Result<Self, EntityError> {
        match value {
            SqlValue::Bytes(value) => Ok(value),
            other => mismatch("Bytes", &other),
        }
    }
}

impl FromSqlValue for Uuid {
    fn from_sql_value(value: SqlValue) -> Result<Self, EntityError> {
        match value {
            SqlValue::Uuid(value) => Ok(value),
            other => mismatch("Uuid", &other),
        }
    }
}

impl FromSqlValue for DateTime<Utc> {
    fn from_sql_value(value: SqlValue) -> Result<Self, EntityError> {
        match value {
            SqlValue::DateTime(value) => Ok(value),
            other => mismatch("DateTime", &other),
        }
    }
}

impl FromSqlValue for NaiveDateTime {
    fn from_sql_value(value: SqlValue) -> Result<Self, EntityError> {
        match value {
            SqlValue::NaiveDateTime(value) => Ok(value),
            other => mismatch("NaiveDateTime", &other),
        }
    }
}

impl FromSqlValue for NaiveDate {
    fn from_sql_value(value: SqlValue) -> Result<Self, EntityError> {
        match value {
            SqlValue::Date(value) => Ok(value),
            other => mismatch("Date", &other),
        }
    }
}

impl FromSqlValue for JsonValue {
    fn from_sql_value(value: SqlValue) -> Result<Self, EntityError> {
        match value {
            SqlValue::Json(value) => Ok(value),
            SqlValue::Null => Ok(JsonValue::Null),
            other => mismatch("Json", &other),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: SqlValue) -> Result<Self, EntityError> {
        match value {
            SqlValue::Null => Ok(None),
            value => T::from_sql_value(value).map(Some),
        }
    }
}

/// Implements [`Entity`] for a plain struct.
///
/// Each field is listed with its column type and the schema method that
/// declares its role (`column`, `primary_key`, `identity_key`, `explicit_key`,
/// `identity` or `computed`). Field names are used as column names.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, Default)]
/// pub struct Account {
///     pub id: i64,
///     pub email: String,
///     pub created_at: Option<DateTime<Utc>>,
/// }
///
/// impl_entity!(Account, "public.accounts", {
///     id: SqlType::BigInt => identity_key,
///     email: SqlType::Text => column,
///     created_at: SqlType::Timestamptz => computed,
/// });
/// ```
#[macro_export]
macro_rules! impl_entity {
    (
        $entity:ty,
        $table:expr,
        { $( $field:ident : $sql_type:expr => $role:ident ),+ $(,)? }
    ) => {
        impl $crate::Entity for $entity {
            fn schema() -> $crate::EntitySchema {
                $crate::EntitySchema::new($table)
                    $( .$role(stringify!($field), $sql_type) )+
            }

            fn value(&self, column: &str) -> Option<$crate::SqlValue> {
                match column {
                    $( stringify!($field) => Some($crate::SqlValue::from(self.$field.clone())), )+
                    _ => None,
                }
            }

            fn apply(
                &mut self,
                column: &str,
                value: $crate::SqlValue,
            ) -> Result<(), $crate::EntityError> {
                match column {
                    $(
                        stringify!($field) => {
                            self.$field = $crate::FromSqlValue::from_sql_value(value)?;
                            Ok(())
                        }
                    )+
                    _ => Err($crate::EntityError::UnknownColumn(column.to_string())),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widening() {
        assert_eq!(i64::from_sql_value(SqlValue::Integer(5)).unwrap(), 5);
        assert_eq!(i64::from_sql_value(SqlValue::SmallInt(-2)).unwrap(), -2);
        assert_eq!(i32::from_sql_value(SqlValue::BigInt(12)).unwrap(), 12);
    }

    #[test]
    fn test_integer_narrowing_out_of_range() {
        let err = i16::from_sql_value(SqlValue::BigInt(70_000)).unwrap_err();
        assert_eq!(err, EntityError::OutOfRange { value: 70_000, target: "i16" });
    }

    #[test]
    fn test_null_into_required_field() {
        assert_eq!(String::from_sql_value(SqlValue::Null).unwrap_err(), EntityError::UnexpectedNull);
        assert_eq!(Option::<String>::from_sql_value(SqlValue::Null).unwrap(), None);
    }

    #[test]
    fn test_type_mismatch() {
        let err = bool::from_sql_value(SqlValue::Text("yes".to_string())).unwrap_err();
        assert_eq!(err, EntityError::TypeMismatch { expected: "Bool", found: "Text" });
    }

    #[test]
    fn test_optional_some() {
        let value = Option::<i64>::from_sql_value(SqlValue::BigInt(3)).unwrap();
        assert_eq!(value, Some(3));
    }
}
