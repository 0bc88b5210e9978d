//! # Deletion
//!
//! Passes over instances that carry a deletion marker.
//!
//! | Derived state    | Action                                                         |
//! |------------------|----------------------------------------------------------------|
//! | `DeleteSucceeded`| remove the finalizer; the store then releases the object       |
//! | `DeleteFailed`   | nothing until a new delete request re-arms it                  |
//! | anything else    | backend delete, then remove the finalizer or record the failure |
//!
//! The last row covers objects deleted directly through the store, bypassing the broker,
//! and re-armed deletes, which the store accepts on a deleting object only after a failure.

use super::{Reconciler, ReconcilerError};
use crate::crd::{apply_outcome, derive_state, OperationPhase, OperationType, OsbInstance};
use crate::provider::BackendOutcome;
use tracing::{info, warn};

impl Reconciler {
    pub(super) async fn finalize(&self, mut instance: OsbInstance) -> Result<(), ReconcilerError> {
        let id = instance.metadata.name.clone().unwrap_or_default();

        match derive_state(&instance.status) {
            Ok(state) if state.operation == OperationType::Delete => match state.phase {
                OperationPhase::Succeeded => {
                    info!("Instance {} deleted, removing finalizer", id);
                    instance.remove_finalizer();
                    self.write_or_drop(&instance).await?;
                    return Ok(());
                }
                OperationPhase::Failed => {
                    info!("Delete of instance {} failed, waiting for a new delete request", id);
                    return Ok(());
                }
                OperationPhase::InProgress => {}
            },
            Ok(_) => {}
            Err(e) => warn!("Deleting instance {} in invalid state: {}", id, e),
        }

        let outcome = self
            .bridge
            .execute(&id, OperationType::Delete, instance.spec.parameters.as_ref())
            .await?;

        apply_outcome(
            &mut instance.status,
            OperationType::Delete,
            outcome.error_message(),
        );
        match outcome {
            BackendOutcome::Succeeded { .. } => {
                info!("Backend deleted instance {}, removing finalizer", id);
                instance.remove_finalizer();
            }
            BackendOutcome::Failed(error) => {
                warn!("Backend failed to delete instance {}: {}", id, error);
            }
        }
        self.write_or_drop(&instance).await?;
        Ok(())
    }
}
