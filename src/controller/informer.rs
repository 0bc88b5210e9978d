//! # Informer
//!
//! Feeds watch events into the reflector cache and the work queue.
//!
//! Every event for an object enqueues its key after the queue's dedup delay, including
//! deletions (the pass then finds the key gone from the cache and does nothing).

use super::InstanceKey;
use crate::crd::OsbInstance;
use crate::queue::WorkQueue;
use crate::runtime::error_policy::handle_watch_stream_error;
use futures::{Stream, StreamExt};
use kube_runtime::reflector::{store::Writer, ObjectRef};
use kube_runtime::watcher;
use tracing::{debug, info};

/// Apply watch events to `writer` and enqueue affected keys until the stream ends
pub async fn run_informer<S>(
    stream: S,
    mut writer: Writer<OsbInstance>,
    queue: WorkQueue<InstanceKey>,
) where
    S: Stream<Item = Result<watcher::Event<OsbInstance>, watcher::Error>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut initial = 0usize;

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                handle_watch_stream_error(&e);
                continue;
            }
        };

        writer.apply_watcher_event(&event);
        match &event {
            watcher::Event::Init => {
                debug!("Watch (re)listing instances");
                initial = 0;
            }
            watcher::Event::InitApply(instance) => {
                initial += 1;
                queue.enqueue(ObjectRef::from_obj(instance));
            }
            watcher::Event::InitDone => {
                info!("Watch cache synced with {} instances", initial);
            }
            watcher::Event::Apply(instance) | watcher::Event::Delete(instance) => {
                queue.enqueue(ObjectRef::from_obj(instance));
            }
        }
    }
    info!("Watch stream ended");
}
