//! # Error Policy
//!
//! What happens after a failed reconciliation pass or a failed watch call.
//!
//! Reconciliation: transient failures are requeued with per-key exponential backoff up to
//! the retry ceiling, then dropped. Defects and store answers that a retry would only
//! repeat are dropped immediately.
//!
//! Watch: errors are classified and logged; the watcher's own backoff restarts the stream.

use crate::controller::{InstanceKey, ReconcilerError};
use crate::observability::metrics;
use crate::queue::WorkQueue;
use kube_runtime::watcher;
use tracing::{error, warn};

/// What the queue driver did with a key after its pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Pass succeeded; retry bookkeeping cleared
    Forgotten,
    /// Transient failure; scheduled again with backoff
    Requeued,
    /// Permanent failure or retry ceiling reached; retry bookkeeping cleared
    Dropped,
}

/// Apply the retry policy to the result of a pass over `key`
pub fn handle_reconciliation_result(
    queue: &WorkQueue<InstanceKey>,
    key: &InstanceKey,
    result: Result<(), ReconcilerError>,
    max_retries: u32,
) -> RetryDecision {
    let error = match result {
        Ok(()) => {
            queue.forget(key);
            return RetryDecision::Forgotten;
        }
        Err(error) => error,
    };
    metrics::increment_reconciliation_errors();

    if !error.is_retriable() {
        error!("Dropping {} after non-retriable error: {}", key.name, error);
        metrics::increment_dropped(error.reason());
        queue.forget(key);
        return RetryDecision::Dropped;
    }

    let requeues = queue.num_requeues(key);
    if requeues < max_retries {
        warn!(
            "Error reconciling {} (attempt {} of {}), requeueing: {}",
            key.name,
            requeues + 1,
            max_retries + 1,
            error
        );
        metrics::increment_requeues(error.reason());
        queue.add_rate_limited(key.clone());
        return RetryDecision::Requeued;
    }

    error!(
        "Dropping {} out of the queue after {} retries: {}",
        key.name, requeues, error
    );
    metrics::increment_dropped("max_retries");
    queue.forget(key);
    RetryDecision::Dropped
}

/// Classification of a watch stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401/403: RBAC revoked or token expired
    Unauthorized,
    /// 410: resource version too old, a relist follows
    Expired,
    /// 429: API server throttling or storage reinitializing
    Throttled,
    /// 404: the CRD is not installed
    NotFound,
    Other,
}

pub fn classify_watch_error(message: &str) -> WatchErrorKind {
    let has = |needle: &str| message.contains(needle);
    if has("401") || has("403") || has("Unauthorized") || has("Forbidden") {
        WatchErrorKind::Unauthorized
    } else if has("410") || has("too old resource version") || has("Expired") || has("Gone") {
        WatchErrorKind::Expired
    } else if has("429") || has("TooManyRequests") || has("storage is (re)initializing") {
        WatchErrorKind::Throttled
    } else if has("404") || has("NotFound") || has("not found") {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Log a watch stream error according to its classification
pub fn handle_watch_stream_error(error: &watcher::Error) -> WatchErrorKind {
    let message = error.to_string();
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %message
    );
    let _error_guard = error_span.enter();

    let kind = classify_watch_error(&message);
    match kind {
        WatchErrorKind::Unauthorized => {
            error!("Watch authentication failed - RBAC may have been revoked or the token expired");
            error!("   Verify: kubectl auth can-i watch osbinstances.brokernetes.io");
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired, relisting");
        }
        WatchErrorKind::Throttled => {
            warn!("API server throttling the watch, backing off");
        }
        WatchErrorKind::NotFound => {
            error!("OsbInstance resource not found - is the CRD installed?");
            error!("   Installation: crdgen | kubectl apply -f -");
        }
        WatchErrorKind::Other => {
            error!("Watch stream error: {}", message);
        }
    }
    kind
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::crd::{OsbInstance, OsbInstanceSpec};
    use crate::storage::{ClientError, StorageError};
    use kube_runtime::reflector::ObjectRef;
    use std::time::Duration;

    fn queue() -> WorkQueue<InstanceKey> {
        WorkQueue::new(&QueueConfig {
            dedup_delay: Duration::ZERO,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        })
    }

    fn key() -> InstanceKey {
        ObjectRef::from_obj(&OsbInstance::new("a", "default", OsbInstanceSpec::default()))
    }

    fn transient() -> ReconcilerError {
        ReconcilerError::Storage(StorageError::Client(ClientError::Other(
            "connection reset".to_string(),
        )))
    }

    #[tokio::test]
    async fn test_success_forgets() {
        let queue = queue();
        let key = key();
        queue.add_rate_limited(key.clone());

        let decision = handle_reconciliation_result(&queue, &key, Ok(()), 3);
        assert_eq!(decision, RetryDecision::Forgotten);
        assert_eq!(queue.num_requeues(&key), 0);
    }

    #[tokio::test]
    async fn test_transient_error_requeues_until_ceiling() {
        let queue = queue();
        let key = key();

        for attempt in 0..3 {
            assert_eq!(
                handle_reconciliation_result(&queue, &key, Err(transient()), 3),
                RetryDecision::Requeued,
                "attempt {attempt}"
            );
        }
        assert_eq!(queue.num_requeues(&key), 3);
        assert_eq!(
            handle_reconciliation_result(&queue, &key, Err(transient()), 3),
            RetryDecision::Dropped
        );
        assert_eq!(queue.num_requeues(&key), 0);
    }

    #[tokio::test]
    async fn test_defect_is_dropped_without_retry() {
        let queue = queue();
        let key = key();
        let decision = handle_reconciliation_result(
            &queue,
            &key,
            Err(ReconcilerError::Defect("no InProgress condition".to_string())),
            15,
        );
        assert_eq!(decision, RetryDecision::Dropped);
        assert_eq!(queue.num_requeues(&key), 0);
    }

    #[test]
    fn test_classify_watch_error() {
        assert_eq!(
            classify_watch_error("ApiError: Unauthorized (ErrorResponse { code: 401 })"),
            WatchErrorKind::Unauthorized
        );
        assert_eq!(
            classify_watch_error("too old resource version: 123 (456)"),
            WatchErrorKind::Expired
        );
        assert_eq!(
            classify_watch_error("storage is (re)initializing"),
            WatchErrorKind::Throttled
        );
        assert_eq!(
            classify_watch_error("the server could not find the requested resource (404)"),
            WatchErrorKind::NotFound
        );
        assert_eq!(classify_watch_error("connection reset"), WatchErrorKind::Other);
    }
}
