//! # Reconciler
//!
//! One reconciliation pass per dequeued key.
//!
//! A pass reads the key from the watch cache, makes sure the finalizer is present, and
//! then acts on the `InProgress` condition: if an operation was requested it is dispatched
//! to the backend and its outcome written back with a single conditional write. A version
//! conflict on that write drops the pass; the watch event for the newer version queues
//! the key again.

mod deletion;
mod types;

pub use types::{Reconciler, ReconcilerError};

use crate::crd::{
    apply_outcome, derive_state, ConditionType, OperationPhase, OperationType, OsbInstance,
};
use crate::observability::metrics;
use crate::provider::BackendOutcome;
use crate::storage::StorageError;
use kube_runtime::reflector::ObjectRef;
use tracing::{debug, info, warn};

impl Reconciler {
    /// Run one reconciliation pass for `key`
    pub async fn reconcile(&self, key: &ObjectRef<OsbInstance>) -> Result<(), ReconcilerError> {
        let Some(cached) = self.cache.get(key) else {
            debug!("Instance no longer in cache, nothing to do");
            return Ok(());
        };
        // Never mutate the shared cache entry
        let mut instance = (*cached).clone();
        let id = key.name.as_str();

        if !instance.has_finalizer() {
            if instance.is_deleting() {
                debug!("Instance is being deleted without our finalizer, skipping");
                return Ok(());
            }
            instance.add_finalizer();
            info!("Adding finalizer to instance {}", id);
            self.write_or_drop(&instance).await?;
            return Ok(());
        }

        if instance.is_deleting() {
            return self.finalize(instance).await;
        }

        let in_progress = instance
            .status
            .condition(ConditionType::InProgress)
            .ok_or_else(|| {
                ReconcilerError::Defect(format!("instance {id} has no InProgress condition"))
            })?;
        if !in_progress.is_true() {
            return self.release_if_deleted(&instance).await;
        }

        let operation = instance.status.last_operation_type.ok_or_else(|| {
            ReconcilerError::Defect(format!(
                "instance {id} is in progress without an operation type"
            ))
        })?;

        let outcome = self
            .bridge
            .execute(id, operation, instance.spec.parameters.as_ref())
            .await?;

        let succeeded = outcome.error_message().is_none();
        let changed = apply_outcome(&mut instance.status, operation, outcome.error_message());
        if !changed {
            return Err(ReconcilerError::Defect(format!(
                "{operation} outcome for instance {id} did not change any condition"
            )));
        }
        if let BackendOutcome::Succeeded { output } = outcome {
            if operation != OperationType::Delete {
                instance.spec.output = output;
            }
        }

        info!(
            "Recording {} for instance {}",
            derive_state(&instance.status)
                .map(|state| state.to_string())
                .unwrap_or_else(|e| e.to_string()),
            id
        );
        let written = self.write_or_drop(&instance).await?;

        if written && succeeded && operation == OperationType::Delete {
            self.remove(id).await?;
        }
        Ok(())
    }

    /// Conditional write. A version conflict means the pass worked on a stale copy;
    /// the pass is dropped without error. Returns whether the write landed.
    async fn write_or_drop(&self, instance: &OsbInstance) -> Result<bool, ReconcilerError> {
        match self.storage.write(instance).await {
            Ok(_) => Ok(true),
            Err(StorageError::Conflict(id)) => {
                warn!("Conflict writing instance {}, dropping stale pass", id);
                metrics::increment_dropped("conflict");
                Ok(false)
            }
            Err(StorageError::NotFound(id)) => {
                debug!("Instance {} disappeared before write", id);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ask the store to delete a settled `DeleteSucceeded` instance. A previous pass may have
    /// recorded the outcome but failed to issue the delete.
    async fn release_if_deleted(&self, instance: &OsbInstance) -> Result<(), ReconcilerError> {
        let deleted = matches!(
            derive_state(&instance.status),
            Ok(state) if state.operation == OperationType::Delete
                && state.phase == OperationPhase::Succeeded
        );
        if !deleted {
            return Ok(());
        }
        let id = instance.metadata.name.as_deref().unwrap_or_default();
        self.remove(id).await
    }

    async fn remove(&self, id: &str) -> Result<(), ReconcilerError> {
        match self.storage.remove(id).await {
            Ok(()) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
