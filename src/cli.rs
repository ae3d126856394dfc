//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Nimbus - declarative instance controller
#[derive(Parser, Debug)]
#[command(name = "nimbus")]
#[command(version)]
#[command(about = "Keeps Instance records converged with the provisioning service")]
#[command(
    long_about = "Nimbus reads Instance manifests, creates a backing compute instance for every record that lacks one and records the identity assigned by the provisioning service."
)]
pub struct Cli {
    /// Config file (TOML, or JSON by extension)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the reconciliation loop until Ctrl+C
    Run {
        /// Instance manifest files (YAML or JSON)
        #[arg(short, long, required = true)]
        manifests: Vec<PathBuf>,
    },

    /// Reconcile every record a fixed number of times and print the result
    Reconcile {
        /// Instance manifest files (YAML or JSON)
        #[arg(short, long, required = true)]
        manifests: Vec<PathBuf>,

        /// Maximum passes per record
        #[arg(long, default_value_t = 2)]
        passes: u32,
    },

    /// Check manifests without contacting the provisioning service
    Validate {
        /// Instance manifest files (YAML or JSON)
        #[arg(short, long, required = true)]
        manifests: Vec<PathBuf>,
    },
}
