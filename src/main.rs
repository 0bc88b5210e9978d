//! # Brokernetes Controller
//!
//! Runs the broker API and the reconciliation controller in one process.
//!
//! ## Overview
//!
//! - **Broker API**: Open Service Broker v2 endpoints that record create/update/delete intent
//!   on `OsbInstance` resources and report the last operation
//! - **Controller**: watches `OsbInstance` resources and drives requested operations to
//!   completion against the provisioning backend
//! - **Observability**: Prometheus metrics at `/metrics`, probes at `/healthz` and `/readyz`
//!
//! Configuration is read from environment variables, see [`brokernetes::config`].

use anyhow::{Context, Result};
use brokernetes::broker::Broker;
use brokernetes::controller::{run_informer, Controller, Reconciler};
use brokernetes::provider::{BackendBridge, DemoBackend, ProvisioningBackend};
use brokernetes::queue::WorkQueue;
use brokernetes::runtime::initialization::{initialize, InitializationResult};
use brokernetes::server::{router, start_server, ServerState};
use brokernetes::storage::{InstanceStorage, KubeInstanceClient};
use kube_runtime::reflector;
use kube_runtime::watcher;
use kube_runtime::WatchStreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let InitializationResult {
        config,
        client,
        instances,
    } = initialize().await?;
    let namespace = config.controller.namespace.clone();

    // Watch cache and informer
    let (reader, writer) = reflector::store();
    let queue = WorkQueue::new(&config.controller.queue);
    let stream = watcher(instances, watcher::Config::default()).default_backoff();
    let informer = tokio::spawn(run_informer(stream, writer, queue.clone()));
    let informer_abort = informer.abort_handle();

    // Store, backend and controller
    let storage = InstanceStorage::new(
        Arc::new(KubeInstanceClient::new(client, &namespace)),
        &namespace,
    );
    let backend: Arc<dyn ProvisioningBackend> = Arc::new(DemoBackend::new(
        Duration::from_millis(config.broker.demo_backend_delay_ms),
    ));
    let bridge = Arc::new(BackendBridge::new(backend));
    let reconciler = Reconciler::new(reader.clone(), storage.clone(), bridge);
    let controller = Arc::new(Controller::new(
        queue,
        reconciler,
        config.controller.max_retries,
    ));

    // HTTP server
    let server_state = Arc::new(ServerState::default());
    let broker = Arc::new(
        Broker::new(storage, config.broker.clone()).context("Invalid broker configuration")?,
    );
    let (server_shutdown_tx, mut server_shutdown_rx) = tokio::sync::watch::channel(false);
    let server = tokio::spawn(start_server(
        config.server.port,
        router(broker, Arc::clone(&server_state)),
        Arc::clone(&server_state),
        async move {
            // An error means the sender is gone, which is a shutdown too
            let _ = server_shutdown_rx.changed().await;
        },
    ));

    {
        let reader = reader.clone();
        let server_state = Arc::clone(&server_state);
        tokio::spawn(async move {
            if reader.wait_until_ready().await.is_ok() {
                info!("Watch cache synced, marking ready");
                server_state.mark_ready();
            }
        });
    }

    controller
        .run(config.controller.workers, async move {
            shutdown_signal().await;
            info!("Shutdown signal received, stopping watch");
            informer_abort.abort();
        })
        .await?;

    // The receiver may already be gone if the server failed on its own
    let _ = server_shutdown_tx.send(true);
    match server.await.context("HTTP server task panicked")? {
        Ok(()) => info!("HTTP server stopped"),
        Err(e) => error!("HTTP server error: {:#}", e),
    }
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
