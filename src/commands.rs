//! CLI command handlers.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use nimbus_core::{Instance, ManifestFormat, parse_manifests};
use nimbus_provisioner::HttpProvisioningClient;
use nimbus_reconciler::{
    InMemoryRuntime, ReconcileOutcome, Reconciler, ReconcilerBuilder, ReconciliationLoop,
};
use nimbus_store::{InMemoryInstanceStore, InstanceStorage, TracingInstanceStorage};
use tokio::signal;
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::config::ControllerConfig;

/// Execute a CLI command.
///
/// # Errors
///
/// Propagates configuration, manifest and reconciliation failures.
pub async fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run { manifests } => {
            let config = ControllerConfig::load(cli.config.as_deref())?;
            cmd_run(&config, &manifests).await
        }
        Commands::Reconcile { manifests, passes } => {
            let config = ControllerConfig::load(cli.config.as_deref())?;
            cmd_reconcile(&config, &manifests, passes).await
        }
        Commands::Validate { manifests } => cmd_validate(&manifests),
    }
}

/// Read and parse every manifest file.
///
/// # Errors
///
/// Fails on the first unreadable or unparsable file.
pub fn load_manifests(paths: &[PathBuf]) -> Result<Vec<Instance>> {
    paths.iter().try_fold(Vec::new(), |mut all, path| {
        all.extend(load_manifest(path)?);
        Ok(all)
    })
}

fn load_manifest(path: &Path) -> Result<Vec<Instance>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    parse_manifests(&content, ManifestFormat::from_path(path))
        .with_context(|| format!("Failed to parse manifest {}", path.display()))
}

/// Create an in-memory store holding `instances`.
///
/// # Errors
///
/// Fails when two manifests declare the same record.
pub async fn seed_store(instances: Vec<Instance>) -> Result<Arc<dyn InstanceStorage>> {
    let store = TracingInstanceStorage::new(InMemoryInstanceStore::new());
    for instance in instances {
        store.create(instance).await?;
    }
    Ok(Arc::new(store))
}

/// Wire a reconciler to the configured provisioning service.
///
/// The runtime layer starts empty; a record that already carries an identity
/// is never created again.
///
/// # Errors
///
/// Fails when the provisioning service is not configured.
pub fn build_reconciler(
    config: &ControllerConfig,
    store: Arc<dyn InstanceStorage>,
) -> Result<Reconciler> {
    let client = HttpProvisioningClient::with_config(config.provisioner()?)?;
    info!(endpoint = %client.endpoint(), "Provisioning client ready");

    Ok(ReconcilerBuilder::new()
        .with_store(store)
        .with_runtime(Arc::new(InMemoryRuntime::new()))
        .with_provisioner(Arc::new(client))
        .build()?)
}

/// Reconcile each record up to `passes` times, stopping early once it
/// converged.
///
/// # Errors
///
/// Fails on the first pass that returns an error.
pub async fn reconcile_records(
    reconciler: &Reconciler,
    instances: &[Instance],
    passes: u32,
) -> Result<Vec<ReconcileOutcome>> {
    let mut outcomes = Vec::with_capacity(instances.len());
    for instance in instances {
        let key = instance.key();
        let mut last = None;
        for pass in 1..=passes {
            let outcome = reconciler
                .reconcile(&key)
                .await
                .with_context(|| format!("Pass {pass} over {key} failed"))?;
            let converged = outcome.is_converged();
            info!(record = %key, pass, state = %outcome.state, "Pass finished");
            last = Some(outcome);
            if converged {
                break;
            }
        }
        if let Some(outcome) = last {
            outcomes.push(outcome);
        }
    }
    Ok(outcomes)
}

async fn cmd_run(config: &ControllerConfig, manifests: &[PathBuf]) -> Result<()> {
    let instances = load_manifests(manifests)?;
    info!(count = instances.len(), "Loaded instance manifests");

    let store = seed_store(instances).await?;
    let reconciler = build_reconciler(config, Arc::clone(&store))?;
    let loop_runner =
        ReconciliationLoop::new(Arc::new(reconciler), Arc::clone(&store), config.reconciler.clone());

    let stopper = loop_runner.stopper();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
        }
        stopper.stop();
    });

    info!("Nimbus is running. Press Ctrl+C to stop.");
    loop_runner.run().await?;

    print_records(&store.list().await?)
}

async fn cmd_reconcile(config: &ControllerConfig, manifests: &[PathBuf], passes: u32) -> Result<()> {
    if passes == 0 {
        bail!("--passes must be at least 1");
    }
    let instances = load_manifests(manifests)?;
    let store = seed_store(instances.clone()).await?;
    let reconciler = build_reconciler(config, Arc::clone(&store))?;

    reconcile_records(&reconciler, &instances, passes).await?;

    print_records(&store.list().await?)
}

fn cmd_validate(manifests: &[PathBuf]) -> Result<()> {
    let instances = load_manifests(manifests)?;
    let invalid: Vec<String> = instances
        .iter()
        .filter_map(|instance| instance.validate().err())
        .map(|e| e.to_string())
        .collect();

    if invalid.is_empty() {
        println!("{} instance(s) valid", instances.len());
        Ok(())
    } else {
        for reason in &invalid {
            eprintln!("{reason}");
        }
        bail!("{} of {} instance(s) invalid", invalid.len(), instances.len())
    }
}

fn print_records(instances: &[Instance]) -> Result<()> {
    let json = serde_json::to_string_pretty(instances).context("Failed to render records")?;
    println!("{json}");
    Ok(())
}
