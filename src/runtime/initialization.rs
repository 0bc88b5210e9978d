//! # Initialization
//!
//! Process bootstrap: rustls setup, tracing, metrics, configuration, Kubernetes client
//! and the CRD queryability check.

use crate::config::{load_config, Config};
use crate::crd::OsbInstance;
use crate::observability;
use anyhow::{anyhow, Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{error, info, warn, Instrument};

/// Components produced by [`initialize`]
pub struct InitializationResult {
    pub config: Config,
    pub client: Client,
    /// API scoped to the watched namespace
    pub instances: Api<OsbInstance>,
}

/// Install the ring crypto provider for rustls 0.23+.
///
/// Must run before any TLS connection is made.
pub fn install_crypto_provider() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))
}

/// Install the global tracing subscriber, filtered by `RUST_LOG`
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

/// Bootstrap the controller process
pub async fn initialize() -> Result<InitializationResult> {
    install_crypto_provider()?;
    init_tracing("brokernetes=info,brokernetes_controller=info");

    info!(
        "Starting {} v{}",
        crate::constants::CONTROLLER_NAME,
        env!("CARGO_PKG_VERSION")
    );

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let config = load_config();
    info!(
        "Configuration: namespace={}, workers={}, max_retries={}, dedup_delay={:?}, backoff={:?}..{:?}",
        config.controller.namespace,
        config.controller.workers,
        config.controller.max_retries,
        config.controller.queue.dedup_delay,
        config.controller.queue.base_delay,
        config.controller.queue.max_delay
    );

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let instances: Api<OsbInstance> = Api::namespaced(client.clone(), &config.controller.namespace);

    check_crd_queryable(&instances).await;

    Ok(InitializationResult {
        config,
        client,
        instances,
    })
}

/// List existing instances once so a missing CRD shows up clearly at startup.
///
/// Failure is logged, not fatal: the watcher keeps retrying with backoff.
async fn check_crd_queryable(instances: &Api<OsbInstance>) {
    let span = tracing::span!(
        tracing::Level::INFO,
        "controller.startup.check_crd",
        operation = "list_instances"
    );
    let listed = instances
        .list(&ListParams::default())
        .instrument(span.clone())
        .await;
    let _guard = span.enter();

    match listed {
        Ok(list) => {
            let mut names: Vec<_> = list
                .items
                .iter()
                .filter_map(|item| item.metadata.name.as_deref())
                .collect();
            names.sort_unstable();
            info!("CRD is queryable, found {} existing OsbInstance resources", names.len());
            if !names.is_empty() {
                info!(
                    "  Instances: {}",
                    if names.len() <= 3 {
                        names.join(", ")
                    } else {
                        format!("{}, ... ({} total)", names[..3].join(", "), names.len())
                    }
                );
            }
        }
        Err(e) => {
            error!("CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - the watch will retry");
        }
    }
}
