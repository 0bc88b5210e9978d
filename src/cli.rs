//! # brokerctl
//!
//! Command-line interface for inspecting and managing broker service instances.
//!
//! ## Usage
//!
//! ```bash
//! # List all service instances in a namespace
//! brokerctl list --namespace default
//!
//! # Show the status of a service instance
//! brokerctl status --name 5a6e1bd8-instance
//!
//! # Request deletion of a service instance
//! brokerctl delete --name 5a6e1bd8-instance
//! ```

use anyhow::{Context, Result};
use brokernetes::constants::DEFAULT_WATCH_NAMESPACE;
use brokernetes::storage::{InstanceRecord, InstanceStorage, KubeInstanceClient};
use clap::{Parser, Subcommand};
use kube::Client;
use std::sync::Arc;

/// Brokernetes service instance CLI
#[derive(Parser)]
#[command(name = "brokerctl")]
#[command(about = "Inspect and manage brokernetes service instances", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace holding the instances
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all service instances
    List,
    /// Show the status of a service instance
    Status {
        /// Instance ID
        #[arg(long)]
        name: String,
    },
    /// Request deletion of a service instance
    Delete {
        /// Instance ID
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "brokerctl=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let namespace = cli
        .namespace
        .unwrap_or_else(|| DEFAULT_WATCH_NAMESPACE.to_string());

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;
    let storage = InstanceStorage::new(
        Arc::new(KubeInstanceClient::new(client, &namespace)),
        &namespace,
    );

    match cli.command {
        Commands::List => list_command(&storage).await,
        Commands::Status { name } => status_command(&storage, &name).await,
        Commands::Delete { name } => delete_command(&storage, &name).await,
    }
}

async fn list_command(storage: &InstanceStorage) -> Result<()> {
    let instances = storage
        .list_instances()
        .await
        .context("Failed to list service instances")?;

    if instances.is_empty() {
        println!(
            "No service instances found in namespace '{}'.",
            storage.namespace()
        );
        return Ok(());
    }

    println!("{:<40} {:<20} {}", "INSTANCE", "STATE", "ERROR");
    println!("{}", "-".repeat(80));
    for (id, record) in instances {
        match record {
            Ok(record) => println!(
                "{:<40} {:<20} {}",
                id,
                record.state,
                record.error.as_deref().unwrap_or("")
            ),
            Err(e) => println!("{:<40} {:<20} {}", id, "Invalid", e),
        }
    }
    Ok(())
}

async fn status_command(storage: &InstanceStorage, id: &str) -> Result<()> {
    let record = storage
        .get_instance(id)
        .await
        .with_context(|| format!("Failed to get instance '{}/{}'", storage.namespace(), id))?;
    print_record(&record)
}

fn print_record(record: &InstanceRecord) -> Result<()> {
    println!("Instance: {}", record.instance_id);
    println!("State:    {}", record.state);
    if let Some(error) = &record.error {
        println!("Error:    {}", error);
    }
    if let Some(parameters) = &record.parameters {
        println!("\nParameters:\n{}", serde_json::to_string_pretty(parameters)?);
    }
    if let Some(output) = &record.output {
        println!("\nOutput:\n{}", serde_json::to_string_pretty(output)?);
    }
    Ok(())
}

async fn delete_command(storage: &InstanceStorage, id: &str) -> Result<()> {
    storage
        .delete_instance(id)
        .await
        .with_context(|| {
            format!("Failed to request deletion of '{}/{}'", storage.namespace(), id)
        })?;
    println!("Deletion requested for '{}/{}'.", storage.namespace(), id);
    println!("The controller will release the backend resources shortly.");
    Ok(())
}
