//! # Work Queue
//!
//! Deduplicating, delay-aware, rate-limited queue of resource keys fed by watch notifications.
//!
//! Guarantees:
//! - A key is delivered to at most one worker at a time. Re-adding a key while it is being
//!   processed marks it dirty; it is redelivered once [`WorkQueue::done`] is called.
//! - A key that is queued but not yet delivered is never queued twice.
//! - Delayed adds of a key that is already waiting are absorbed; the earliest deadline wins.
//!   This collapses bursts of watch events for one resource into a single pass.

mod rate_limiter;

pub use rate_limiter::ExponentialRateLimiter;

use crate::config::QueueConfig;
use crate::observability;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rate-limited work queue. Cloning yields another handle to the same queue.
#[derive(Debug)]
pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Debug)]
struct Inner<K> {
    state: Mutex<State<K>>,
    notify: Notify,
    dedup_delay: Duration,
}

#[derive(Debug)]
struct State<K> {
    /// Keys ready for delivery, in order
    queue: VecDeque<K>,
    /// Keys that need processing (queued, or re-added while processing)
    dirty: HashSet<K>,
    /// Keys currently handed out to a worker
    processing: HashSet<K>,
    /// Keys scheduled for a future add, with their deadline
    waiting: HashMap<K, Instant>,
    limiter: ExponentialRateLimiter<K>,
    shutting_down: bool,
}

impl<K> State<K>
where
    K: Clone + Eq + Hash,
{
    /// Returns true if a waiter should be woken
    fn add(&mut self, key: K) -> bool {
        if self.shutting_down {
            return false;
        }
        if !self.dirty.insert(key.clone()) {
            return false;
        }
        if self.processing.contains(&key) {
            return false;
        }
        self.queue.push_back(key);
        observability::metrics::set_queue_depth(self.queue.len());
        true
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    waiting: HashMap::new(),
                    limiter: ExponentialRateLimiter::new(config.base_delay, config.max_delay),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                dedup_delay: config.dedup_delay,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedules `key` after the dedup delay. Used for watch notifications.
    pub fn enqueue(&self, key: K) {
        self.add_after(key, self.inner.dedup_delay);
    }

    /// Queues `key` for immediate delivery
    pub fn add(&self, key: K) {
        let wake = self.lock().add(key);
        if wake {
            self.inner.notify.notify_one();
        }
    }

    /// Queues `key` once `delay` has elapsed.
    ///
    /// If the key is already waiting with an earlier or equal deadline the call is absorbed.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let ready_at = Instant::now() + delay;
        {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            match state.waiting.get(&key) {
                Some(existing) if *existing <= ready_at => return,
                _ => {
                    state.waiting.insert(key.clone(), ready_at);
                }
            }
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available for delayed add, queueing immediately");
            self.lock().waiting.remove(&key);
            self.add(key);
            return;
        };

        let queue = self.clone();
        handle.spawn(async move {
            tokio::time::sleep_until(ready_at).await;
            let wake = {
                let mut state = queue.lock();
                // A later add may have moved the deadline earlier and already fired
                if state.waiting.get(&key) == Some(&ready_at) {
                    state.waiting.remove(&key);
                    state.add(key)
                } else {
                    false
                }
            };
            if wake {
                queue.inner.notify.notify_one();
            }
        });
    }

    /// Reschedules `key` with exponential backoff based on its failure count
    pub fn add_rate_limited(&self, key: K) {
        let delay = self.lock().limiter.when(&key);
        debug!("Requeueing with backoff of {:?}", delay);
        self.add_after(key, delay);
    }

    /// Number of times `key` has been rate-limited since it was last forgotten
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.lock().limiter.num_requeues(key)
    }

    /// Clears the retry bookkeeping for `key`
    pub fn forget(&self, key: &K) {
        self.lock().limiter.forget(key);
    }

    /// Waits for the next key. Returns `None` once the queue is shutting down.
    ///
    /// Every returned key must be released with [`WorkQueue::done`].
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    observability::metrics::set_queue_depth(state.queue.len());
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Releases the processing slot for `key`, redelivering it if it was re-added meanwhile
    pub fn done(&self, key: &K) {
        let wake = {
            let mut state = self.lock();
            state.processing.remove(key);
            if state.dirty.contains(key) && !state.shutting_down {
                state.queue.push_back(key.clone());
                observability::metrics::set_queue_depth(state.queue.len());
                true
            } else {
                false
            }
        };
        if wake {
            self.inner.notify.notify_one();
        }
    }

    /// Stops accepting work and wakes every blocked [`WorkQueue::get`].
    ///
    /// Keys already handed out may still finish and call [`WorkQueue::done`].
    pub fn shut_down(&self) {
        {
            let mut state = self.lock();
            state.shutting_down = true;
            state.waiting.clear();
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of keys ready for delivery
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
