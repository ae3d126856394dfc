//! # Nimbus - instance controller
//!
//! Entry point of the `nimbus` binary.
//!
//! ## Commands
//!
//! - `run`: seed the store from manifests and reconcile until Ctrl+C
//! - `reconcile`: run a fixed number of passes per record and print them
//! - `validate`: check manifests offline
//!
//! The provisioning service is located through `NEBULA_REST_API_HOST_IP` and
//! `NEBULA_REST_API_HOST_PORT`, or a `[provisioner]` table in `--config`.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use nimbus::cli::Cli;
use nimbus::commands::execute_command;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    info!(command = ?cli.command, "Nimbus starting");

    execute_command(cli).await
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
