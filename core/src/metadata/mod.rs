//! Record type metadata: schema declaration, column roles and the process-wide
//! descriptor cache.

mod entity;
mod resolver;
mod schema;

pub use entity::{Entity, EntityError, FromSqlValue};
pub use resolver::{resolve, RecordDescriptor, UnsupportedShapeError};
pub use schema::{ColumnDescriptor, EntitySchema, Generated, KeyRole};
