//! Bulk write metrics helpers.

use super::definitions::{
    BULK_BATCH_SIZE, BULK_OPERATIONS_TOTAL, BULK_ROWS_AFFECTED_TOTAL, BULK_STATEMENTS_TOTAL,
    BULK_STATEMENT_DURATION, DB_POOL_CONNECTIONS,
};
use super::timer::TimerGuard;

/// Operation status labels.
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const ERROR: &str = "error";
    pub const CANCELLED: &str = "cancelled";
}

/// Record a finished bulk operation.
pub fn record_operation(operation: &str, status: &str) {
    BULK_OPERATIONS_TOTAL.with_label_values(&[operation, status]).inc();
}

/// Record rows affected by one statement, split by the action applied to them.
pub fn record_rows(operation: &str, inserted: u64, updated: u64, deleted: u64) {
    for (action, count) in [("insert", inserted), ("update", updated), ("delete", deleted)] {
        if count > 0 {
            BULK_ROWS_AFFECTED_TOTAL.with_label_values(&[operation, action]).inc_by(count as f64);
        }
    }
}

/// Record the outcome of one statement.
pub fn record_statement(operation: &str, records: usize, success: bool) {
    let status = if success { status::SUCCESS } else { status::ERROR };
    BULK_STATEMENTS_TOTAL.with_label_values(&[operation, status]).inc();
    BULK_BATCH_SIZE.with_label_values(&[operation]).observe(records as f64);
}

/// Create a timer for one statement. Records duration on drop.
pub fn time_statement<'a>(operation: &str) -> TimerGuard<'a> {
    TimerGuard::new(&BULK_STATEMENT_DURATION, &[operation])
}

/// Update connection pool metrics.
pub fn set_pool_connections(active: u32, idle: u32) {
    DB_POOL_CONNECTIONS.with_label_values(&["active"]).set(f64::from(active));
    DB_POOL_CONNECTIONS.with_label_values(&["idle"]).set(f64::from(idle));
}
