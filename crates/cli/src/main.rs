//! Rightsize CLI
//!
//! A command-line tool for previewing what the admission webhook would do
//! to a pod and for inspecting the statistics it decides from.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{lookup, simulate};
use rightsize_lib::ReqwestFetcher;
use std::path::PathBuf;
use std::time::Duration;

/// Rightsize CLI
#[derive(Parser)]
#[command(name = "rightsize")]
#[command(author, version, about = "CLI for the Rightsize admission webhook", long_about = None)]
pub struct Cli {
    /// Statistics endpoint URL (can also be set via RIGHTSIZE_STATS_URL env var)
    #[arg(long, env = "RIGHTSIZE_STATS_URL")]
    pub stats_url: Option<String>,

    /// Timeout for the statistics fetch, in seconds
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show how the webhook would rewrite a pod manifest
    Simulate {
        /// Path to a Pod manifest in JSON
        manifest: PathBuf,

        /// Namespace the pod is admitted into (defaults to the manifest's)
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Show the statistics held for a workload
    Lookup {
        /// Workload key (format: Kind/namespace/name)
        workload: String,
    },
}

/// Where and how to reach the statistics backend
pub struct StatsSource {
    pub url: String,
    timeout: Duration,
}

impl StatsSource {
    pub fn fetcher(&self) -> Result<ReqwestFetcher> {
        Ok(ReqwestFetcher::new(self.timeout)?)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let source = StatsSource {
        url: config.resolve_stats_url(cli.stats_url),
        timeout: Duration::from_secs(cli.timeout),
    };

    match cli.command {
        Commands::Simulate { manifest, namespace } => {
            simulate::simulate(&source, &manifest, namespace, cli.format)?;
        }
        Commands::Lookup { workload } => {
            lookup::lookup(&source, &workload, cli.format)?;
        }
    }

    Ok(())
}
