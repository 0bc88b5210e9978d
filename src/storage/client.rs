//! # Instance Client
//!
//! Typed persistence seam for `OsbInstance` resources.
//!
//! The store only needs five calls from its backing API: point read, list, create,
//! conditional replace and delete. [`KubeInstanceClient`] maps them onto the Kubernetes API;
//! [`super::MemoryInstanceClient`] implements them in-process.

use crate::crd::OsbInstance;
use async_trait::async_trait;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client};
use thiserror::Error;

/// Errors returned by an [`InstanceClient`], classified for the store
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("instance {0} not found")]
    NotFound(String),
    #[error("instance {0} already exists")]
    AlreadyExists(String),
    /// The write presented a stale resource version
    #[error("conflict writing instance {0}")]
    Conflict(String),
    #[error("kubernetes API error: {0}")]
    Kube(#[source] kube::Error),
    #[error("{0}")]
    Other(String),
}

impl ClientError {
    /// Classify a kube API error for the named instance
    pub fn from_kube(name: &str, error: kube::Error) -> Self {
        match &error {
            kube::Error::Api(response) if response.code == 404 => {
                ClientError::NotFound(name.to_string())
            }
            kube::Error::Api(response) if response.code == 409 => {
                if response.reason == "AlreadyExists" {
                    ClientError::AlreadyExists(name.to_string())
                } else {
                    ClientError::Conflict(name.to_string())
                }
            }
            _ => ClientError::Kube(error),
        }
    }
}

/// Persistence operations the store needs, scoped to a single namespace
#[async_trait]
pub trait InstanceClient: Send + Sync {
    /// Point read. `Ok(None)` when the instance does not exist.
    async fn get(&self, name: &str) -> Result<Option<OsbInstance>, ClientError>;

    async fn list(&self) -> Result<Vec<OsbInstance>, ClientError>;

    /// Create a new instance; fails with `AlreadyExists` if the name is taken
    async fn create(&self, instance: &OsbInstance) -> Result<OsbInstance, ClientError>;

    /// Replace an instance, conditional on `metadata.resourceVersion`.
    /// A stale version fails with `Conflict`.
    async fn replace(&self, instance: &OsbInstance) -> Result<OsbInstance, ClientError>;

    /// Request deletion. Instances carrying finalizers are only marked as deleting.
    async fn delete(&self, name: &str) -> Result<(), ClientError>;
}

/// [`InstanceClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeInstanceClient {
    api: Api<OsbInstance>,
}

impl KubeInstanceClient {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }

    pub fn api(&self) -> &Api<OsbInstance> {
        &self.api
    }
}

fn name_of(instance: &OsbInstance) -> Result<&str, ClientError> {
    instance
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ClientError::Other("instance has no name".to_string()))
}

#[async_trait]
impl InstanceClient for KubeInstanceClient {
    async fn get(&self, name: &str) -> Result<Option<OsbInstance>, ClientError> {
        self.api
            .get_opt(name)
            .await
            .map_err(|e| ClientError::from_kube(name, e))
    }

    async fn list(&self) -> Result<Vec<OsbInstance>, ClientError> {
        self.api
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| ClientError::from_kube("*", e))
    }

    async fn create(&self, instance: &OsbInstance) -> Result<OsbInstance, ClientError> {
        let name = name_of(instance)?;
        self.api
            .create(&PostParams::default(), instance)
            .await
            .map_err(|e| ClientError::from_kube(name, e))
    }

    async fn replace(&self, instance: &OsbInstance) -> Result<OsbInstance, ClientError> {
        let name = name_of(instance)?;
        if instance.metadata.resource_version.is_none() {
            // An unconditional replace would bypass optimistic concurrency
            return Err(ClientError::Conflict(name.to_string()));
        }
        self.api
            .replace(name, &PostParams::default(), instance)
            .await
            .map_err(|e| ClientError::from_kube(name, e))
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| ClientError::from_kube(name, e))
    }
}
