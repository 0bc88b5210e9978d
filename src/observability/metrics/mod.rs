//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text exposition
//! - `controller_metrics` - Reconciliation passes, requeues, drops and store conflicts
//! - `backend_metrics` - Provisioning backend calls
//! - `queue_metrics` - Work queue depth

pub mod backend_metrics;
pub mod controller_metrics;
pub mod queue_metrics;
pub mod registry;

pub use backend_metrics::*;
pub use controller_metrics::*;
pub use queue_metrics::*;
pub use registry::*;
