//! pgwarden agent
//!
//! Runs one extension reconciliation pass for the pod it is invoked on:
//! reads the cluster resource from a file, resolves the desired extension
//! list against the repository index, brings the pod's extension tree in
//! line, and persists the updated status back. Scheduling repeated passes
//! is the caller's concern (an init container runs one restart pass, a
//! sidecar loops with `--skip-shared-library-overwrites`).

mod status_file;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pgwarden_core::config::DEFAULT_CHANNEL;
use pgwarden_core::types::Cluster;
use pgwarden_core::ExtensionsConfig;
use pgwarden_extensions::{ExtensionManager, ExtensionReconciler, HttpClient, NativeFileSystem};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use status_file::FileStatusWriter;

#[derive(Parser)]
#[command(name = "pgwarden-agent", version, about = "Per-pod PostgreSQL extension reconciliation agent")]
struct Cli {
    /// Cluster resource file (YAML)
    #[arg(long, env = "PGWARDEN_CLUSTER_FILE")]
    cluster_file: PathBuf,

    /// Name of the pod this agent reconciles
    #[arg(long, env = "PGWARDEN_POD_NAME")]
    pod: String,

    /// Default extensions repository URI
    #[arg(long, env = "PGWARDEN_REPOSITORY")]
    repository: Url,

    /// Root of the pod's extensions directory tree
    #[arg(
        long,
        env = "PGWARDEN_EXTENSIONS_PATH",
        default_value = "/var/lib/postgresql/extensions"
    )]
    extensions_path: PathBuf,

    /// Build version of the pod's database image (e.g., "6.0.2")
    #[arg(long, env = "PGWARDEN_BUILD_VERSION")]
    build_version: String,

    /// Channel consulted when a request names neither version nor channel
    #[arg(long, default_value = DEFAULT_CHANNEL)]
    default_channel: String,

    /// Defer any install or removal that would overwrite a shared library
    /// already on disk (sidecar mode, database process running)
    #[arg(long)]
    skip_shared_library_overwrites: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let raw = std::fs::read_to_string(&cli.cluster_file).with_context(|| {
        format!("Failed to read cluster file {}", cli.cluster_file.display())
    })?;
    let mut cluster: Cluster = serde_yaml_ng::from_str(&raw).with_context(|| {
        format!("Failed to parse cluster file {}", cli.cluster_file.display())
    })?;

    let config = ExtensionsConfig {
        repository: cli.repository.clone(),
        default_channel: cli.default_channel.clone(),
        extensions_path: cli.extensions_path.clone(),
        postgres_version: cluster.spec.postgres_version.clone(),
        build_version: cli.build_version.clone(),
    };

    let fs = Arc::new(NativeFileSystem::new());
    let web = Arc::new(HttpClient::new()?);
    let manager = ExtensionManager::new(fs, web, config);
    let reconciler =
        ExtensionReconciler::new(&cli.pod, manager, cli.skip_shared_library_overwrites);

    // A spec that fails to resolve keeps its installed version in the
    // desired list, so a repository outage surfaces as a reported error on
    // every pass rather than as a removal
    let (to_install, resolution_errors) = reconciler.resolve_desired(&cluster).await;
    for error in &resolution_errors {
        warn!("Cannot resolve desired extension: {}", error);
    }

    let writer = FileStatusWriter::new(cli.cluster_file.clone());
    let result = reconciler
        .reconcile_and_persist(&mut cluster, &to_install, &writer)
        .await
        .context("Failed to persist cluster status")?;

    if result.updated {
        info!("Updated extension status for pod {}", cli.pod);
    } else {
        info!("Extension status for pod {} is unchanged", cli.pod);
    }

    let failures = resolution_errors.len() + result.errors.len();
    if failures > 0 {
        bail!("{failures} extension(s) failed to reconcile on pod {}", cli.pod);
    }
    Ok(())
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
