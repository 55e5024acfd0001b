use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::database::executor::{BulkExecutor, Capabilities};
use crate::database::sql_value::{SqlType, SqlValue};
use crate::impl_entity;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    pub id: i64,
    pub customer: String,
    pub quantity: i32,
    pub total: Option<Decimal>,
}

impl_entity!(Order, "public.orders", {
    id: SqlType::BigInt => identity_key,
    customer: SqlType::Text => column,
    quantity: SqlType::Integer => column,
    total: SqlType::Numeric => computed,
});

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Member {
    pub team_id: i64,
    pub code: String,
    pub name: String,
}

impl_entity!(Member, "public.members", {
    team_id: SqlType::BigInt => explicit_key,
    code: SqlType::Text => explicit_key,
    name: SqlType::Text => column,
});

impl Member {
    pub fn new(team_id: i64, code: &str, name: &str) -> Self {
        Self { team_id, code: code.to_string(), name: name.to_string() }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub label: String,
}

impl_entity!(Tag, "public.tags", {
    label: SqlType::Text => explicit_key,
});

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Keyless {
    pub message: String,
}

impl_entity!(Keyless, "public.events", {
    message: SqlType::Text => column,
});

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("mock failure: {0}")]
pub struct MockError(pub String);

#[derive(Debug, Clone)]
pub enum MockResponse {
    Count(u64),
    Rows(Vec<Vec<SqlValue>>),
    Fail(MockError),
    /// Sleeps, then answers with zero rows.
    Delay(Duration),
}

/// Executor answering statements from a script, in order. Every statement is
/// recorded with its parameters. An exhausted script answers with zero rows.
pub struct MockExecutor {
    capabilities: Capabilities,
    responses: Mutex<VecDeque<MockResponse>>,
    calls: Mutex<Vec<(String, Vec<SqlValue>)>>,
    cancels: AtomicUsize,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::bulk_merge())
    }

    pub fn single_row() -> Self {
        Self::with_capabilities(Capabilities::single_row())
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
        }
    }

    pub fn respond(self, response: MockResponse) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    fn next(&self, sql: &str, params: &[SqlValue]) -> Option<MockResponse> {
        self.calls.lock().unwrap().push((sql.to_string(), params.to_vec()));
        self.responses.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl BulkExecutor for MockExecutor {
    type Error = MockError;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, MockError> {
        match self.next(sql, params) {
            Some(MockResponse::Count(count)) => Ok(count),
            Some(MockResponse::Rows(rows)) => Ok(rows.len() as u64),
            Some(MockResponse::Fail(e)) => Err(e),
            Some(MockResponse::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(0)
            }
            None => Ok(0),
        }
    }

    async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        _column_types: &[SqlType],
    ) -> Result<Vec<Vec<SqlValue>>, MockError> {
        match self.next(sql, params) {
            Some(MockResponse::Rows(rows)) => Ok(rows),
            Some(MockResponse::Count(_)) | None => Ok(Vec::new()),
            Some(MockResponse::Fail(e)) => Err(e),
            Some(MockResponse::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(Vec::new())
            }
        }
    }

    async fn cancel(&self) -> Result<(), MockError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One `RETURNING s."__ordinal", merge_action(), ...` row.
pub fn output_row(ordinal: i32, action: &str, values: Vec<SqlValue>) -> Vec<SqlValue> {
    let mut row = vec![SqlValue::Integer(ordinal), SqlValue::from(action)];
    row.extend(values);
    row
}
