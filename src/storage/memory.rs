//! # In-Memory Instance Client
//!
//! An in-process stand-in for the API server, used by tests and local runs.
//!
//! It behaves like the real thing where the controller depends on it:
//! - every write bumps a monotonically increasing `resourceVersion`
//! - a replace presenting a stale or missing version fails with `Conflict`
//! - deleting an object with finalizers only sets `deletionTimestamp`; the object
//!   disappears once a replace removes the last finalizer
//! - [`MemoryInstanceClient::watch`] replays the current objects and then streams changes

use super::client::{ClientError, InstanceClient};
use crate::crd::OsbInstance;
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::{Stream, StreamExt};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use kube_runtime::watcher;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

type Subscriber = UnboundedSender<watcher::Event<OsbInstance>>;

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<String, OsbInstance>,
    resource_version: u64,
    subscribers: Vec<Subscriber>,
}

impl MemoryState {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn broadcast(&mut self, event: &watcher::Event<OsbInstance>) {
        self.subscribers
            .retain(|subscriber| subscriber.unbounded_send(event.clone()).is_ok());
    }
}

/// [`InstanceClient`] holding objects in memory for a single namespace
pub struct MemoryInstanceClient {
    namespace: String,
    state: Mutex<MemoryState>,
}

impl MemoryInstanceClient {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Watch stream: `Init`, one `InitApply` per stored object, `InitDone`, then live
    /// `Apply`/`Delete` events. The stream ends when the client is dropped.
    pub fn watch(
        &self,
    ) -> impl Stream<Item = Result<watcher::Event<OsbInstance>, watcher::Error>> + Send + 'static
    {
        let (tx, rx) = unbounded();
        let mut state = self.lock();
        let mut replay = vec![watcher::Event::Init];
        replay.extend(state.objects.values().cloned().map(watcher::Event::InitApply));
        replay.push(watcher::Event::InitDone);
        for event in replay {
            // The receiver is still in scope, so sending cannot fail
            let _ = tx.unbounded_send(event);
        }
        state.subscribers.push(tx);
        rx.map(Ok)
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn now_time() -> Result<Time, ClientError> {
    serde_json::from_value(serde_json::Value::String(chrono::Utc::now().to_rfc3339()))
        .map_err(|e| ClientError::Other(format!("invalid timestamp: {e}")))
}

fn name_of(instance: &OsbInstance) -> Result<String, ClientError> {
    instance
        .metadata
        .name
        .clone()
        .ok_or_else(|| ClientError::Other("instance has no name".to_string()))
}

#[async_trait]
impl InstanceClient for MemoryInstanceClient {
    async fn get(&self, name: &str) -> Result<Option<OsbInstance>, ClientError> {
        Ok(self.lock().objects.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<OsbInstance>, ClientError> {
        Ok(self.lock().objects.values().cloned().collect())
    }

    async fn create(&self, instance: &OsbInstance) -> Result<OsbInstance, ClientError> {
        let name = name_of(instance)?;
        let mut state = self.lock();
        if state.objects.contains_key(&name) {
            return Err(ClientError::AlreadyExists(name));
        }

        let mut stored = instance.clone();
        let version = state.next_version();
        stored.metadata.namespace = Some(self.namespace.clone());
        stored.metadata.uid = Some(format!("uid-{version}"));
        stored.metadata.resource_version = Some(version);
        stored.metadata.creation_timestamp = Some(now_time()?);
        stored.metadata.deletion_timestamp = None;

        state.objects.insert(name, stored.clone());
        state.broadcast(&watcher::Event::Apply(stored.clone()));
        Ok(stored)
    }

    async fn replace(&self, instance: &OsbInstance) -> Result<OsbInstance, ClientError> {
        let name = name_of(instance)?;
        let mut state = self.lock();
        let Some(current) = state.objects.get(&name) else {
            return Err(ClientError::NotFound(name));
        };
        if instance.metadata.resource_version.is_none()
            || instance.metadata.resource_version != current.metadata.resource_version
        {
            debug!(
                "Rejecting stale write of {} (presented {:?}, stored {:?})",
                name, instance.metadata.resource_version, current.metadata.resource_version
            );
            return Err(ClientError::Conflict(name));
        }

        let mut stored = instance.clone();
        // Server-managed fields cannot be changed by a replace
        stored.metadata.namespace = current.metadata.namespace.clone();
        stored.metadata.uid = current.metadata.uid.clone();
        stored.metadata.creation_timestamp = current.metadata.creation_timestamp.clone();
        stored.metadata.deletion_timestamp = current.metadata.deletion_timestamp.clone();
        stored.metadata.resource_version = Some(state.next_version());

        if stored.metadata.deletion_timestamp.is_some() && stored.finalizers().is_empty() {
            state.objects.remove(&name);
            state.broadcast(&watcher::Event::Delete(stored.clone()));
        } else {
            state.objects.insert(name, stored.clone());
            state.broadcast(&watcher::Event::Apply(stored.clone()));
        }
        Ok(stored)
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        let mut state = self.lock();
        let Some(current) = state.objects.get(name).cloned() else {
            return Err(ClientError::NotFound(name.to_string()));
        };

        if current.finalizers().is_empty() {
            state.objects.remove(name);
            state.broadcast(&watcher::Event::Delete(current));
            return Ok(());
        }
        if current.metadata.deletion_timestamp.is_some() {
            return Ok(());
        }

        let mut marked = current;
        marked.metadata.deletion_timestamp = Some(now_time()?);
        marked.metadata.resource_version = Some(state.next_version());
        state.objects.insert(name.to_string(), marked.clone());
        state.broadcast(&watcher::Event::Apply(marked));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::OsbInstanceSpec;

    fn instance(name: &str) -> OsbInstance {
        OsbInstance::new(name, "default", OsbInstanceSpec::default())
    }

    #[tokio::test]
    async fn test_create_assigns_resource_version() {
        let client = MemoryInstanceClient::new("default");
        let created = client.create(&instance("a")).await.unwrap();
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));
        assert!(matches!(
            client.create(&instance("a")).await,
            Err(ClientError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_replace_rejects_stale_version() {
        let client = MemoryInstanceClient::new("default");
        let created = client.create(&instance("a")).await.unwrap();

        let mut first = created.clone();
        first.spec.parameters = Some(serde_json::json!({"v": 1}));
        client.replace(&first).await.unwrap();

        let mut second = created;
        second.spec.parameters = Some(serde_json::json!({"v": 2}));
        assert!(matches!(
            client.replace(&second).await,
            Err(ClientError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_with_finalizer_marks_deleting_until_released() {
        let client = MemoryInstanceClient::new("default");
        let mut with_finalizer = instance("a");
        with_finalizer.add_finalizer();
        client.create(&with_finalizer).await.unwrap();

        client.delete("a").await.unwrap();
        let mut marked = client.get("a").await.unwrap().unwrap();
        assert!(marked.is_deleting());

        marked.remove_finalizer();
        client.replace(&marked).await.unwrap();
        assert!(client.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_watch_replays_then_streams() {
        let client = MemoryInstanceClient::new("default");
        client.create(&instance("a")).await.unwrap();

        let mut stream = Box::pin(client.watch());
        assert!(matches!(stream.next().await, Some(Ok(watcher::Event::Init))));
        assert!(matches!(
            stream.next().await,
            Some(Ok(watcher::Event::InitApply(_)))
        ));
        assert!(matches!(
            stream.next().await,
            Some(Ok(watcher::Event::InitDone))
        ));

        client.delete("a").await.unwrap();
        assert!(matches!(
            stream.next().await,
            Some(Ok(watcher::Event::Delete(_)))
        ));
    }
}
