//! # Provisioning Backends
//!
//! The provisioning capability the controller drives, and the bridge that adapts
//! reconciliation intents to it.
//!
//! Backend calls may take minutes and block the calling worker for their full duration.
//! Backends must be idempotent: after a crash the same operation can be dispatched again.

mod bridge;

pub use bridge::{BackendBridge, BackendOutcome, BridgeError};

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Failure reported by a provisioning backend.
///
/// The message is recorded verbatim on the instance's `Error` condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// External provisioning capability
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Provision `instance_id`. The returned output is stored on the instance.
    async fn create_instance(
        &self,
        instance_id: &str,
        parameters: Option<&Value>,
    ) -> Result<Option<Value>, BackendError>;

    /// Apply new `parameters` to `instance_id`
    async fn update_instance(
        &self,
        instance_id: &str,
        parameters: Option<&Value>,
    ) -> Result<Option<Value>, BackendError>;

    async fn delete_instance(
        &self,
        instance_id: &str,
        parameters: Option<&Value>,
    ) -> Result<(), BackendError>;
}

/// Backend that succeeds after an optional artificial delay, for local runs
#[derive(Debug, Clone, Default)]
pub struct DemoBackend {
    delay: Duration,
}

impl DemoBackend {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    async fn work(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl ProvisioningBackend for DemoBackend {
    async fn create_instance(
        &self,
        instance_id: &str,
        _parameters: Option<&Value>,
    ) -> Result<Option<Value>, BackendError> {
        info!("Demo backend creating instance {}", instance_id);
        self.work().await;
        Ok(Some(serde_json::json!({ "provisionedBy": "demo", "operation": "create" })))
    }

    async fn update_instance(
        &self,
        instance_id: &str,
        _parameters: Option<&Value>,
    ) -> Result<Option<Value>, BackendError> {
        info!("Demo backend updating instance {}", instance_id);
        self.work().await;
        Ok(Some(serde_json::json!({ "provisionedBy": "demo", "operation": "update" })))
    }

    async fn delete_instance(
        &self,
        instance_id: &str,
        _parameters: Option<&Value>,
    ) -> Result<(), BackendError> {
        info!("Demo backend deleting instance {}", instance_id);
        self.work().await;
        Ok(())
    }
}
