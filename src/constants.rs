//! # Constants
//!
//! Default values for controller, queue, broker and server configuration.

/// API group of the `OsbInstance` custom resource
pub const API_GROUP: &str = "brokernetes.io";

/// API version of the `OsbInstance` custom resource
pub const API_VERSION: &str = "v1";

/// Kind of the `OsbInstance` custom resource
pub const INSTANCE_KIND: &str = "OsbInstance";

/// Plural resource name used in API paths
pub const INSTANCE_PLURAL: &str = "osbinstances";

/// Singular resource name
pub const INSTANCE_SINGULAR: &str = "osbinstance";

/// Finalizer that keeps an instance around until the controller released it
pub const FINALIZER_NAME: &str = "brokernetes.io/osb-worker";

/// Field manager / user agent name
pub const CONTROLLER_NAME: &str = "brokernetes-controller";

/// Default namespace watched by the controller
pub const DEFAULT_WATCH_NAMESPACE: &str = "default";

/// Default number of reconciliation workers
pub const DEFAULT_WORKER_COUNT: usize = 20;

/// Default dedup delay applied to every watch-triggered enqueue (milliseconds)
pub const DEFAULT_QUEUE_DEDUP_DELAY_MS: u64 = 50;

/// Default number of times a key is retried before it is dropped out of the queue.
///
/// With the default rate limiter (5ms * 2^(retries-1)) the requeue delays are:
/// 5ms, 10ms, 20ms, 40ms, 80ms, 160ms, 320ms, 640ms, 1.3s, 2.6s, 5.1s, 10.2s, 20.4s, 41s, 82s
pub const DEFAULT_MAX_RETRIES: u32 = 15;

/// Default base delay of the per-item exponential rate limiter (milliseconds)
pub const DEFAULT_RATE_LIMIT_BASE_DELAY_MS: u64 = 5;

/// Default cap of the per-item exponential rate limiter (seconds)
pub const DEFAULT_RATE_LIMIT_MAX_DELAY_SECS: u64 = 1000;

/// Default HTTP port for the broker API, metrics and probes
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default catalog service id
pub const DEFAULT_SERVICE_ID: &str = "uuid1";

/// Default catalog service name
pub const DEFAULT_SERVICE_NAME: &str = "my-service";

/// Default catalog plan id
pub const DEFAULT_PLAN_ID: &str = "uuid2";

/// Default catalog plan name
pub const DEFAULT_PLAN_NAME: &str = "default";

/// Default catalog service description
pub const DEFAULT_SERVICE_DESCRIPTION: &str = "Service instances provisioned by brokernetes";

/// Default catalog plan description
pub const DEFAULT_PLAN_DESCRIPTION: &str = "Default plan";

/// Default artificial latency of the demo provisioning backend (milliseconds)
pub const DEFAULT_DEMO_BACKEND_DELAY_MS: u64 = 0;
