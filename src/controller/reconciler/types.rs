//! # Reconciler Types
//!
//! Reconciler context and error classification.

use crate::crd::OsbInstance;
use crate::provider::{BackendBridge, BridgeError};
use crate::storage::{InstanceStorage, StorageError};
use kube_runtime::reflector::Store;
use std::sync::Arc;
use thiserror::Error;

/// Shared context for reconciliation passes
pub struct Reconciler {
    /// Watch cache, read-only; objects are deep-copied before mutation
    pub(crate) cache: Store<OsbInstance>,
    pub(crate) storage: InstanceStorage,
    pub(crate) bridge: Arc<BackendBridge>,
}

impl Reconciler {
    pub fn new(
        cache: Store<OsbInstance>,
        storage: InstanceStorage,
        bridge: Arc<BackendBridge>,
    ) -> Self {
        Self {
            cache,
            storage,
            bridge,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    /// Data or logic bug; retrying cannot help
    #[error("defect: {0}")]
    Defect(String),
}

impl ReconcilerError {
    /// Whether the pass should be retried with backoff.
    ///
    /// Only transient infrastructure failures qualify. Invalid state and other defects are
    /// dropped, as are store answers that a retry would only repeat.
    pub fn is_retriable(&self) -> bool {
        match self {
            ReconcilerError::Storage(error) => matches!(error, StorageError::Client(_)),
            ReconcilerError::Bridge(_) => true,
            ReconcilerError::Defect(_) => false,
        }
    }

    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::Storage(_) => "storage",
            ReconcilerError::Bridge(_) => "bridge",
            ReconcilerError::Defect(_) => "defect",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ClientError;

    #[test]
    fn test_retriable_classification() {
        assert!(ReconcilerError::Storage(StorageError::Client(ClientError::Other(
            "connection reset".to_string()
        )))
        .is_retriable());
        assert!(
            ReconcilerError::Bridge(BridgeError::AlreadyProcessing("a".to_string())).is_retriable()
        );

        assert!(!ReconcilerError::Storage(StorageError::NotFound("a".to_string())).is_retriable());
        assert!(!ReconcilerError::Storage(StorageError::Conflict("a".to_string())).is_retriable());
        assert!(!ReconcilerError::Defect("missing condition".to_string()).is_retriable());
    }
}
