//! # Controller Configuration
//!
//! Worker pool, retry ceiling and work queue tuning.

use super::env_var_or_default;
use crate::constants::*;
use std::time::Duration;

/// Work queue tuning: dedup window and per-item backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Window during which repeated watch-triggered enqueues of a key collapse
    pub dedup_delay: Duration,
    /// First backoff after a failed pass, doubled per failure
    pub base_delay: Duration,
    /// Backoff cap
    pub max_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dedup_delay: Duration::from_millis(DEFAULT_QUEUE_DEDUP_DELAY_MS),
            base_delay: Duration::from_millis(DEFAULT_RATE_LIMIT_BASE_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_RATE_LIMIT_MAX_DELAY_SECS),
        }
    }
}

/// Reconciliation controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace watched for `OsbInstance` resources and used by the broker for writes
    pub namespace: String,
    /// Number of concurrent reconciliation workers
    pub workers: usize,
    /// Failed passes retried per key before it is dropped
    pub max_retries: u32,
    pub queue: QueueConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_WATCH_NAMESPACE.to_string(),
            workers: DEFAULT_WORKER_COUNT,
            max_retries: DEFAULT_MAX_RETRIES,
            queue: QueueConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            namespace: env_var_or_default("WATCH_NAMESPACE", DEFAULT_WATCH_NAMESPACE.to_string()),
            workers: env_var_or_default("WORKER_COUNT", DEFAULT_WORKER_COUNT).max(1),
            max_retries: env_var_or_default("MAX_RETRIES", DEFAULT_MAX_RETRIES),
            queue: QueueConfig {
                dedup_delay: Duration::from_millis(env_var_or_default(
                    "QUEUE_DEDUP_DELAY_MS",
                    DEFAULT_QUEUE_DEDUP_DELAY_MS,
                )),
                base_delay: Duration::from_millis(env_var_or_default(
                    "RATE_LIMIT_BASE_DELAY_MS",
                    DEFAULT_RATE_LIMIT_BASE_DELAY_MS,
                )),
                max_delay: Duration::from_secs(env_var_or_default(
                    "RATE_LIMIT_MAX_DELAY_SECS",
                    DEFAULT_RATE_LIMIT_MAX_DELAY_SECS,
                )),
            },
        }
    }
}
