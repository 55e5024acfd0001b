use std::error::Error as StdError;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type as PgType};
use tokio_postgres::Row;
use uuid::Uuid;

/// Declared column type. Drives the cast on every placeholder and how output
/// columns are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    SmallInt,
    Integer,
    BigInt,
    Double,
    Numeric,
    Bool,
    Text,
    Varchar,
    Bytea,
    Uuid,
    Timestamptz,
    Timestamp,
    Date,
    Jsonb,
}

impl SqlType {
    /// Returns the PostgreSQL type string used in `$n::TYPE` casts.
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Numeric => "NUMERIC",
            SqlType::Bool => "BOOL",
            SqlType::Text => "TEXT",
            SqlType::Varchar => "VARCHAR",
            SqlType::Bytea => "BYTEA",
            SqlType::Uuid => "UUID",
            SqlType::Timestamptz => "TIMESTAMPTZ",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Date => "DATE",
            SqlType::Jsonb => "JSONB",
        }
    }

    pub fn to_type(&self) -> PgType {
        match self {
            SqlType::SmallInt => PgType::INT2,
            SqlType::Integer => PgType::INT4,
            SqlType::BigInt => PgType::INT8,
            SqlType::Double => PgType::FLOAT8,
            SqlType::Numeric => PgType::NUMERIC,
            SqlType::Bool => PgType::BOOL,
            SqlType::Text => PgType::TEXT,
            SqlType::Varchar => PgType::VARCHAR,
            SqlType::Bytea => PgType::BYTEA,
            SqlType::Uuid => PgType::UUID,
            SqlType::Timestamptz => PgType::TIMESTAMPTZ,
            SqlType::Timestamp => PgType::TIMESTAMP,
            SqlType::Date => PgType::DATE,
            SqlType::Jsonb => PgType::JSONB,
        }
    }
}

/// A single bound parameter or decoded output value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    Numeric(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    NaiveDateTime(NaiveDateTime),
    Date(NaiveDate),
    Json(JsonValue),
}

impl SqlValue {
    pub fn raw_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "Null",
            SqlValue::Bool(_) => "Bool",
            SqlValue::SmallInt(_) => "SmallInt",
            SqlValue::Integer(_) => "Integer",
            SqlValue::BigInt(_) => "BigInt",
            SqlValue::Double(_) => "Double",
            SqlValue::Numeric(_) => "Numeric",
            SqlValue::Text(_) => "Text",
            SqlValue::Bytes(_) => "Bytes",
            SqlValue::Uuid(_) => "Uuid",
            SqlValue::DateTime(_) => "DateTime",
            SqlValue::NaiveDateTime(_) => "NaiveDateTime",
            SqlValue::Date(_) => "Date",
            SqlValue::Json(_) => "Json",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Decodes column `idx` of `row` according to the declared type.
    pub fn from_row(row: &Row, idx: usize, ty: SqlType) -> Result<SqlValue, tokio_postgres::Error> {
        let value = match ty {
            SqlType::SmallInt => row.try_get::<_, Option<i16>>(idx)?.map(SqlValue::SmallInt),
            SqlType::Integer => row.try_get::<_, Option<i32>>(idx)?.map(SqlValue::Integer),
            SqlType::BigInt => row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::BigInt),
            SqlType::Double => row.try_get::<_, Option<f64>>(idx)?.map(SqlValue::Double),
            SqlType::Numeric => row.try_get::<_, Option<Decimal>>(idx)?.map(SqlValue::Numeric),
            SqlType::Bool => row.try_get::<_, Option<bool>>(idx)?.map(SqlValue::Bool),
            SqlType::Text | SqlType::Varchar => {
                row.try_get::<_, Option<String>>(idx)?.map(SqlValue::Text)
            }
            SqlType::Bytea => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(SqlValue::Bytes),
            SqlType::Uuid => row.try_get::<_, Option<Uuid>>(idx)?.map(SqlValue::Uuid),
            SqlType::Timestamptz => {
                row.try_get::<_, Option<DateTime<Utc>>>(idx)?.map(SqlValue::DateTime)
            }
            SqlType::Timestamp => {
                row.try_get::<_, Option<NaiveDateTime>>(idx)?.map(SqlValue::NaiveDateTime)
            }
            SqlType::Date => row.try_get::<_, Option<NaiveDate>>(idx)?.map(SqlValue::Date),
            SqlType::Jsonb => row.try_get::<_, Option<JsonValue>>(idx)?.map(SqlValue::Json),
        };

        Ok(value.unwrap_or(SqlValue::Null))
    }
}

impl ToSql for SqlValue {
    /// Every variant goes through the checked encoder of its inner type, so a
    /// value bound to a placeholder of an incompatible type is rejected
    /// instead of being reinterpreted.
    fn to_sql(
        &self,
        ty: &PgType,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(value) => value.to_sql_checked(ty, out),
            SqlValue::SmallInt(value) => serialize_integer(i64::from(*value), ty, out),
            SqlValue::Integer(value) => serialize_integer(i64::from(*value), ty, out),
            SqlValue::BigInt(value) => serialize_integer(*value, ty, out),
            SqlValue::Double(value) => match *ty {
                PgType::FLOAT4 => (*value as f32).to_sql_checked(ty, out),
                PgType::NUMERIC => Decimal::try_from(*value)?.to_sql_checked(ty, out),
                _ => value.to_sql_checked(ty, out),
            },
            SqlValue::Numeric(value) => value.to_sql_checked(ty, out),
            SqlValue::Text(value) => value.to_sql_checked(ty, out),
            SqlValue::Bytes(value) => value.to_sql_checked(ty, out),
            SqlValue::Uuid(value) => value.to_sql_checked(ty, out),
            SqlValue::DateTime(value) => value.to_sql_checked(ty, out),
            SqlValue::NaiveDateTime(value) => value.to_sql_checked(ty, out),
            SqlValue::Date(value) => value.to_sql_checked(ty, out),
            SqlValue::Json(value) => value.to_sql_checked(ty, out),
        }
    }

    fn accepts(_ty: &PgType) -> bool {
        true
    }

    to_sql_checked!();
}

// integers are widened on the Rust side, narrow them to whatever the cast asked for
fn serialize_integer(
    value: i64,
    ty: &PgType,
    out: &mut BytesMut,
) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
    match *ty {
        PgType::INT2 => i16::try_from(value)?.to_sql(ty, out),
        PgType::INT4 => i32::try_from(value)?.to_sql(ty, out),
        PgType::NUMERIC => Decimal::from(value).to_sql(ty, out),
        PgType::FLOAT8 => (value as f64).to_sql(ty, out),
        _ => value.to_sql_checked(ty, out),
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i16> for SqlValue {
    fn from(value: i16) -> Self {
        SqlValue::SmallInt(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::BigInt(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Double(value)
    }
}

impl From<Decimal> for SqlValue {
    fn from(value: Decimal) -> Self {
        SqlValue::Numeric(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Bytes(value)
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::DateTime(value)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        SqlValue::NaiveDateTime(value)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(value: NaiveDate) -> Self {
        SqlValue::Date(value)
    }
}

impl From<JsonValue> for SqlValue {
    fn from(value: JsonValue) -> Self {
        SqlValue::Json(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => SqlValue::Null,
        }
    }
}
