//! Prometheus metric definitions for bulk writes.
//!
//! Metrics are lazily registered with the default registry on first access.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec,
    HistogramVec,
};

// =============================================================================
// Operation Metrics
// =============================================================================

/// Total bulk operations.
/// Labels: operation (insert/update/upsert/delete), status (success/error/cancelled)
pub static BULK_OPERATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bulkmerge_operations_total",
        "Total number of bulk write operations",
        &["operation", "status"]
    )
    .expect("failed to register BULK_OPERATIONS_TOTAL")
});

/// Rows reported as affected by committed statements.
/// Labels: operation, action (insert/update/delete)
pub static BULK_ROWS_AFFECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bulkmerge_rows_affected_total",
        "Total number of rows affected by bulk writes",
        &["operation", "action"]
    )
    .expect("failed to register BULK_ROWS_AFFECTED_TOTAL")
});

// =============================================================================
// Statement Metrics
// =============================================================================

/// Total statements (batches) executed.
/// Labels: operation, status (success/error)
pub static BULK_STATEMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bulkmerge_statements_total",
        "Total number of statements executed for bulk writes",
        &["operation", "status"]
    )
    .expect("failed to register BULK_STATEMENTS_TOTAL")
});

/// Statement duration histogram.
/// Labels: operation
/// Buckets from 1ms to 10s, a full batch can be large.
pub static BULK_STATEMENT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "bulkmerge_statement_duration_seconds",
        "Bulk write statement duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("failed to register BULK_STATEMENT_DURATION")
});

/// Records per statement histogram.
/// Labels: operation
pub static BULK_BATCH_SIZE: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "bulkmerge_batch_size_records",
        "Number of records bound into a single statement",
        &["operation"],
        vec![1.0, 10.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0, 30000.0, 65535.0]
    )
    .expect("failed to register BULK_BATCH_SIZE")
});

// =============================================================================
// Connection Metrics
// =============================================================================

/// Database connection pool size.
/// Labels: state (active/idle)
pub static DB_POOL_CONNECTIONS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "bulkmerge_db_pool_connections",
        "Number of connections in the database pool",
        &["state"]
    )
    .expect("failed to register DB_POOL_CONNECTIONS")
});
