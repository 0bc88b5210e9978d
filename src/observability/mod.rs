//! # Observability
//!
//! Prometheus metrics for the controller, work queue and provisioning backend.

pub mod metrics;
