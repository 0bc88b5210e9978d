//! # Instance Storage
//!
//! Durable CRUD for `OsbInstance` resources with optimistic concurrency.
//!
//! Every mutation is a read-modify-write cycle holding the `resourceVersion` it read.
//! Version conflicts are retried from the read without bound; they are cheap and resolve
//! themselves once the competing writer is done. Anything else fails the call.
//!
//! The store is the only writer of `InProgress=True`: requesting an operation marks the
//! instance in progress, and the controller later records the outcome.

mod client;
mod memory;

pub use client::{ClientError, InstanceClient, KubeInstanceClient};
pub use memory::MemoryInstanceClient;

use crate::crd::{
    derive_state, mark_in_progress, ConditionType, InstanceState, InvalidStateError,
    OperationPhase, OperationType, OsbInstance, OsbInstanceSpec,
};
use crate::observability::metrics;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("instance {0} not found")]
    NotFound(String),
    #[error("instance {0} already exists")]
    AlreadyExists(String),
    /// Only surfaced by single-shot writes; read-modify-write cycles retry conflicts
    #[error("conflict writing instance {0}")]
    Conflict(String),
    #[error("instance {0} has an operation in progress")]
    AlreadyInProgress(String),
    #[error("instance {0} is being deleted")]
    Deleting(String),
    #[error("instance {id} is in an invalid state: {source}")]
    InvalidState {
        id: String,
        #[source]
        source: InvalidStateError,
    },
    #[error(transparent)]
    Client(ClientError),
}

impl StorageError {
    fn from_client(error: ClientError) -> Self {
        match error {
            ClientError::NotFound(id) => StorageError::NotFound(id),
            ClientError::AlreadyExists(id) => StorageError::AlreadyExists(id),
            ClientError::Conflict(id) => StorageError::Conflict(id),
            other => StorageError::Client(other),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

/// Snapshot of an instance as reported to broker clients
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub parameters: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
    pub state: InstanceState,
    /// Backend error of the last operation, if it failed
    pub error: Option<String>,
}

/// Resource store over an [`InstanceClient`]
#[derive(Clone)]
pub struct InstanceStorage {
    client: Arc<dyn InstanceClient>,
    namespace: String,
}

impl InstanceStorage {
    pub fn new(client: Arc<dyn InstanceClient>, namespace: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Record the intent to create `id` with `parameters`: InProgress=True, op=Create.
    pub async fn create_instance(
        &self,
        id: &str,
        parameters: serde_json::Value,
    ) -> Result<(), StorageError> {
        let mut instance = OsbInstance::new(
            id,
            &self.namespace,
            OsbInstanceSpec {
                parameters: Some(parameters),
                output: None,
            },
        );
        mark_in_progress(&mut instance.status, OperationType::Create);

        self.client
            .create(&instance)
            .await
            .map_err(StorageError::from_client)?;
        info!(instance = %id, "Recorded create request");
        Ok(())
    }

    /// Record the intent to update `id` to `parameters`.
    ///
    /// Returns `Ok(false)` without writing when the stored parameters are already equal.
    pub async fn update_instance(
        &self,
        id: &str,
        parameters: serde_json::Value,
    ) -> Result<bool, StorageError> {
        let updated = self
            .update(id, |instance| {
                if instance.has_parameters(&parameters) {
                    return false;
                }
                instance.spec.parameters = Some(parameters.clone());
                mark_in_progress(&mut instance.status, OperationType::Update);
                true
            })
            .await?;
        if updated {
            info!(instance = %id, "Recorded update request");
        } else {
            debug!(instance = %id, "Parameters unchanged, update is a no-op");
        }
        Ok(updated)
    }

    /// Record the intent to delete `id`. The backend delete and finalizer removal
    /// happen in a later controller pass.
    ///
    /// An object already marked for deletion is accepted only when its last delete
    /// failed; this re-arms the delete so the finalizer can still be released.
    pub async fn delete_instance(&self, id: &str) -> Result<(), StorageError> {
        self.start_operation(id, true, |instance| {
            mark_in_progress(&mut instance.status, OperationType::Delete);
            true
        })
        .await?;
        info!(instance = %id, "Recorded delete request");
        Ok(())
    }

    /// Read `id` and derive its status
    pub async fn get_instance(&self, id: &str) -> Result<InstanceRecord, StorageError> {
        let instance = self.read(id).await?;
        to_record(id, instance)
    }

    /// Every instance in the namespace with its derived status, or the reason it has none
    pub async fn list_instances(
        &self,
    ) -> Result<Vec<(String, Result<InstanceRecord, StorageError>)>, StorageError> {
        let instances = self
            .client
            .list()
            .await
            .map_err(StorageError::from_client)?;
        Ok(instances
            .into_iter()
            .map(|instance| {
                let id = instance.metadata.name.clone().unwrap_or_default();
                let record = to_record(&id, instance);
                (id, record)
            })
            .collect())
    }

    /// Read-modify-write cycle for starting a new operation on `id`.
    ///
    /// Refuses instances being deleted or with an operation in flight. `mutate` runs on a
    /// fresh copy per attempt and returns whether it changed anything; when it returns
    /// false nothing is written and `Ok(false)` is returned. Conflicts restart the cycle.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Result<bool, StorageError>
    where
        F: FnMut(&mut OsbInstance) -> bool + Send,
    {
        self.start_operation(id, false, mutate).await
    }

    async fn start_operation<F>(
        &self,
        id: &str,
        retry_failed_delete: bool,
        mut mutate: F,
    ) -> Result<bool, StorageError>
    where
        F: FnMut(&mut OsbInstance) -> bool + Send,
    {
        loop {
            let mut instance = self.read(id).await?;

            if instance.is_deleting() && !(retry_failed_delete && is_failed_delete(&instance)) {
                return Err(StorageError::Deleting(id.to_string()));
            }
            let in_progress = instance
                .status
                .condition(ConditionType::InProgress)
                .ok_or_else(|| StorageError::InvalidState {
                    id: id.to_string(),
                    source: InvalidStateError::MissingCondition(ConditionType::InProgress),
                })?;
            if in_progress.is_true() {
                return Err(StorageError::AlreadyInProgress(id.to_string()));
            }

            if !mutate(&mut instance) {
                return Ok(false);
            }

            match self.client.replace(&instance).await {
                Ok(_) => return Ok(true),
                Err(ClientError::Conflict(_)) => {
                    metrics::increment_store_conflicts();
                    debug!(instance = %id, "Conflict on update, retrying from read");
                }
                Err(e) => return Err(StorageError::from_client(e)),
            }
        }
    }

    /// Single conditional write of a copy the caller read earlier.
    /// A stale version surfaces as [`StorageError::Conflict`].
    pub async fn write(&self, instance: &OsbInstance) -> Result<OsbInstance, StorageError> {
        let result = self.client.replace(instance).await;
        if matches!(result, Err(ClientError::Conflict(_))) {
            metrics::increment_store_conflicts();
        }
        result.map_err(StorageError::from_client)
    }

    /// Ask the backing API to delete the object. With the finalizer present this only
    /// marks it deleting.
    pub async fn remove(&self, id: &str) -> Result<(), StorageError> {
        self.client
            .delete(id)
            .await
            .map_err(StorageError::from_client)
    }

    async fn read(&self, id: &str) -> Result<OsbInstance, StorageError> {
        self.client
            .get(id)
            .await
            .map_err(StorageError::from_client)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }
}

fn is_failed_delete(instance: &OsbInstance) -> bool {
    matches!(
        derive_state(&instance.status),
        Ok(InstanceState {
            operation: OperationType::Delete,
            phase: OperationPhase::Failed,
        })
    )
}

fn to_record(id: &str, instance: OsbInstance) -> Result<InstanceRecord, StorageError> {
    let state = derive_state(&instance.status).map_err(|source| StorageError::InvalidState {
        id: id.to_string(),
        source,
    })?;
    Ok(InstanceRecord {
        instance_id: id.to_string(),
        parameters: instance.spec.parameters,
        output: instance.spec.output,
        state,
        error: instance.status.error,
    })
}
