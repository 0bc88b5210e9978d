//! # Queue Metrics

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::IntGauge;
use std::sync::LazyLock;

static QUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "brokernetes_queue_depth",
        "Number of keys ready for delivery in the work queue",
    )
    .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

pub(crate) fn register_queue_metrics() -> Result<()> {
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;
    Ok(())
}

pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(i64::try_from(depth).unwrap_or(i64::MAX));
}
