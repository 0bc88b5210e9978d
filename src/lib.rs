//! # Brokernetes
//!
//! An Open Service Broker whose service instances are Kubernetes custom resources,
//! provisioned in the background by a queue-driven reconciliation controller.
//!
//! ## Flow
//!
//! 1. A broker request records intent in the [`storage`] layer: the `OsbInstance` is marked
//!    `InProgress` with the requested operation type.
//! 2. The [`controller`] informer sees the change and queues the instance key in the
//!    deduplicating, rate-limited [`queue`].
//! 3. A worker dispatches the operation through the [`provider`] bridge and writes the
//!    outcome back as `Ready` or `Error` conditions.
//! 4. Broker clients poll `last_operation`, which derives e.g. `CreateSucceeded` from the
//!    stored conditions.

pub mod broker;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod provider;
pub mod queue;
pub mod runtime;
pub mod server;
pub mod storage;
