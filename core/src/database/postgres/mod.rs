pub mod client;
mod executor;

pub use client::{PostgresClient, PostgresConnectionError, PostgresError};
