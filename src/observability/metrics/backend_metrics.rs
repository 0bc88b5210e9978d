//! # Backend Metrics
//!
//! Calls into the provisioning backend, by operation and result.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec};
use std::sync::LazyLock;

static BACKEND_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "brokernetes_backend_operations_total",
            "Total number of provisioning backend calls",
        ),
        &["operation", "result"],
    )
    .expect("Failed to create BACKEND_OPERATIONS_TOTAL metric - this should never happen")
});

static BACKEND_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "brokernetes_backend_operation_duration_seconds",
            "Duration of provisioning backend calls in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 300.0, 900.0]),
        &["operation"],
    )
    .expect("Failed to create BACKEND_OPERATION_DURATION metric - this should never happen")
});

pub(crate) fn register_backend_metrics() -> Result<()> {
    REGISTRY.register(Box::new(BACKEND_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BACKEND_OPERATION_DURATION.clone()))?;
    Ok(())
}

pub fn record_backend_operation(operation: &str, success: bool, duration: f64) {
    let result = if success { "success" } else { "error" };
    BACKEND_OPERATIONS_TOTAL
        .with_label_values(&[operation, result])
        .inc();
    BACKEND_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}
