//! # Backend Bridge
//!
//! Dispatches an operation to the provisioning backend and records metrics.
//!
//! The work queue already guarantees a single in-flight pass per key. The bridge keeps a
//! second, in-process set of instance ids being processed and refuses overlapping calls
//! for the same id; this never triggers while the queue guarantee holds.

use super::{BackendError, ProvisioningBackend};
use crate::crd::OperationType;
use crate::observability::metrics;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

/// Result of a backend call that was actually made
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOutcome {
    Succeeded { output: Option<Value> },
    Failed(BackendError),
}

impl BackendOutcome {
    /// Error text to record on the instance, if the call failed
    pub fn error_message(&self) -> Option<&str> {
        match self {
            BackendOutcome::Succeeded { .. } => None,
            BackendOutcome::Failed(error) => Some(error.message.as_str()),
        }
    }
}

/// The bridge refused to make a call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("instance {0} is already being processed")]
    AlreadyProcessing(String),
}

pub struct BackendBridge {
    backend: Arc<dyn ProvisioningBackend>,
    processing: Mutex<HashSet<String>>,
}

/// Releases the processing slot on drop, including on cancellation
struct ProcessingGuard<'a> {
    processing: &'a Mutex<HashSet<String>>,
    instance_id: String,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.processing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.instance_id);
    }
}

impl BackendBridge {
    pub fn new(backend: Arc<dyn ProvisioningBackend>) -> Self {
        Self {
            backend,
            processing: Mutex::new(HashSet::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.processing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self, instance_id: &str) -> Option<ProcessingGuard<'_>> {
        if !self.lock().insert(instance_id.to_string()) {
            return None;
        }
        Some(ProcessingGuard {
            processing: &self.processing,
            instance_id: instance_id.to_string(),
        })
    }

    /// Whether a call for `instance_id` is currently running
    pub fn is_processing(&self, instance_id: &str) -> bool {
        self.lock().contains(instance_id)
    }

    /// Run `operation` for `instance_id` against the backend
    pub async fn execute(
        &self,
        instance_id: &str,
        operation: OperationType,
        parameters: Option<&Value>,
    ) -> Result<BackendOutcome, BridgeError> {
        let Some(_guard) = self.acquire(instance_id) else {
            warn!(
                "Backend call for instance {} already running, refusing {}",
                instance_id, operation
            );
            return Err(BridgeError::AlreadyProcessing(instance_id.to_string()));
        };

        let span = info_span!(
            "backend.operation",
            instance.id = instance_id,
            operation = operation.as_str()
        );
        let start = Instant::now();

        let outcome = async {
            info!("Calling backend");
            let result = match operation {
                OperationType::Create => self
                    .backend
                    .create_instance(instance_id, parameters)
                    .await
                    .map(|output| BackendOutcome::Succeeded { output }),
                OperationType::Update => self
                    .backend
                    .update_instance(instance_id, parameters)
                    .await
                    .map(|output| BackendOutcome::Succeeded { output }),
                OperationType::Delete => self
                    .backend
                    .delete_instance(instance_id, parameters)
                    .await
                    .map(|()| BackendOutcome::Succeeded { output: None }),
            };
            result.unwrap_or_else(BackendOutcome::Failed)
        }
        .instrument(span.clone())
        .await;

        let elapsed = start.elapsed();
        metrics::record_backend_operation(
            operation.token(),
            outcome.error_message().is_none(),
            elapsed.as_secs_f64(),
        );
        span.in_scope(|| match &outcome {
            BackendOutcome::Succeeded { .. } => {
                info!("Backend call succeeded after {:?}", elapsed);
            }
            BackendOutcome::Failed(error) => {
                warn!("Backend call failed after {:?}: {}", elapsed, error);
            }
        });

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Backend that blocks create calls until released
    struct GatedBackend {
        release: Notify,
    }

    #[async_trait]
    impl ProvisioningBackend for GatedBackend {
        async fn create_instance(
            &self,
            _instance_id: &str,
            _parameters: Option<&Value>,
        ) -> Result<Option<Value>, BackendError> {
            self.release.notified().await;
            Ok(Some(serde_json::json!({"ok": true})))
        }

        async fn update_instance(
            &self,
            _instance_id: &str,
            _parameters: Option<&Value>,
        ) -> Result<Option<Value>, BackendError> {
            Err(BackendError::new("update not supported"))
        }

        async fn delete_instance(
            &self,
            _instance_id: &str,
            _parameters: Option<&Value>,
        ) -> Result<(), BackendError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_execute_maps_results() {
        let bridge = BackendBridge::new(Arc::new(GatedBackend {
            release: Notify::new(),
        }));

        let outcome = bridge
            .execute("a", OperationType::Update, None)
            .await
            .unwrap();
        assert_eq!(outcome.error_message(), Some("update not supported"));

        let outcome = bridge
            .execute("a", OperationType::Delete, None)
            .await
            .unwrap();
        assert_eq!(outcome, BackendOutcome::Succeeded { output: None });
        assert!(!bridge.is_processing("a"));
    }

    #[tokio::test]
    async fn test_overlapping_call_for_same_instance_is_refused() {
        let backend = Arc::new(GatedBackend {
            release: Notify::new(),
        });
        let bridge = Arc::new(BackendBridge::new(backend.clone()));

        let first = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.execute("a", OperationType::Create, None).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(bridge.is_processing("a"));

        assert_eq!(
            bridge.execute("a", OperationType::Delete, None).await,
            Err(BridgeError::AlreadyProcessing("a".to_string()))
        );
        // Other instances are unaffected
        assert!(bridge.execute("b", OperationType::Delete, None).await.is_ok());

        backend.release.notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            BackendOutcome::Succeeded {
                output: Some(serde_json::json!({"ok": true}))
            }
        );
        assert!(!bridge.is_processing("a"));
    }
}
