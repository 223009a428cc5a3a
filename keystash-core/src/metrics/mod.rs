//! Metrics for keystore operations
//!
//! Recorded through the `metrics` facade. The library installs no recorder
//! or exporter; without one every call here is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

mod collector;

pub use collector::{OperationCounters, OperationsSnapshot};

pub const STORE_OPS: &str = "keystore.operations.store";
pub const LOAD_OPS: &str = "keystore.operations.load";
pub const DELETE_OPS: &str = "keystore.operations.delete";
pub const WIPE_OPS: &str = "keystore.operations.wipe";
pub const COPY_OPS: &str = "keystore.operations.copy";
pub const MOVE_OPS: &str = "keystore.operations.move";
pub const FAILED_OPS: &str = "keystore.operations.failed";
pub const OPERATION_DURATION: &str = "keystore.operation.duration_ms";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(STORE_OPS, "Number of keys stored");
    describe_counter!(LOAD_OPS, "Number of keys loaded");
    describe_counter!(DELETE_OPS, "Number of keys deleted");
    describe_counter!(WIPE_OPS, "Number of keystore wipes");
    describe_counter!(COPY_OPS, "Number of cross-keystore copies");
    describe_counter!(MOVE_OPS, "Number of cross-keystore moves");
    describe_counter!(FAILED_OPS, "Number of failed keystore operations, by error kind");
    describe_histogram!(OPERATION_DURATION, "Keystore operation duration in milliseconds");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Count a failed operation under its error kind
pub fn record_failure(operation: &'static str, kind: &'static str) {
    counter!(FAILED_OPS, "operation" => operation, "kind" => kind).increment(1);
}

/// Timer for measuring operation duration
pub struct Timer {
    operation: &'static str,
    start: Instant,
}

impl Timer {
    /// Start timing `operation`
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) {
        let duration = self.start.elapsed();
        histogram!(OPERATION_DURATION, "operation" => self.operation)
            .record(duration.as_secs_f64() * 1000.0);
    }
}
