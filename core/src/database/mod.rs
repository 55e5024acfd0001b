pub mod executor;
pub mod postgres;
pub mod sql_value;
