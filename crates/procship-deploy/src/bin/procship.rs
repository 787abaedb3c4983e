// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Procship CLI
//!
//! Packages the processes listed in a manifest and deploys them to an execution
//! server. Connection, release and repository settings come from the environment
//! (see `DeployConfig::from_env`); a `.env` file is loaded when present.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use procship_deploy::{DeployConfig, DeploymentOrchestrator, DeploymentPlan, Manifest};

#[derive(Parser)]
#[command(name = "procship")]
#[command(about = "Package and deploy process archives", long_about = None)]
#[command(version)]
struct Cli {
    /// Deployment manifest
    #[arg(short, long, env = "PROCSHIP_MANIFEST", default_value = "procship.json")]
    manifest: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package, publish and start the release's container
    Deploy {
        /// Undeploy an existing container of this release first, aborting its instances
        #[arg(long)]
        overwrite: bool,
    },

    /// Dispose a container
    Undeploy {
        /// Container to dispose (default: the release's container)
        container_id: Option<String>,

        /// Abort active instances before disposing
        #[arg(long)]
        cancel_running: bool,
    },

    /// Deploy the release and migrate running instances out of an older container
    Migrate {
        /// Container currently running the instances
        #[arg(long)]
        from: String,
    },

    /// List containers on the server
    Containers,

    /// List active instances in a container
    Instances {
        /// Container to inspect (default: the release's container)
        container_id: Option<String>,
    },
}

fn load_plan(manifest: &Path) -> anyhow::Result<Arc<DeploymentPlan>> {
    let base_dir = manifest.parent().unwrap_or_else(|| Path::new("."));
    let plan = Manifest::load(manifest)?.into_plan(base_dir)?;
    info!(
        manifest = %manifest.display(),
        processes = plan.processes.len(),
        handlers = plan.handlers.len(),
        services = plan.services.len(),
        dependencies = plan.dependencies.len(),
        "Loaded deployment manifest"
    );
    Ok(Arc::new(plan))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "procship=info,procship_deploy=info,procship_package=info,procship_sdk=info".into()
            }),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let cli = Cli::parse();
    let config = DeployConfig::from_env().context("loading configuration")?;
    info!(
        server = %config.sdk.server_url,
        release = %config.release,
        repository = %config.local_repository.display(),
        "Starting procship"
    );

    let orchestrator = DeploymentOrchestrator::from_config(&config)?;
    let release_container = orchestrator.release().container_id();

    match cli.command {
        Commands::Deploy { overwrite } => {
            let plan = load_plan(&cli.manifest)?;
            let container = orchestrator.try_deploy(&plan, overwrite).await?;
            println!("{} {:?}", container.container_id, container.status);
        }
        Commands::Undeploy {
            container_id,
            cancel_running,
        } => {
            let container_id = container_id.unwrap_or(release_container);
            if !orchestrator.undeploy(&container_id, cancel_running).await? {
                bail!("container {} could not be disposed", container_id);
            }
            println!("{} disposed", container_id);
        }
        Commands::Migrate { from } => {
            let plan = load_plan(&cli.manifest)?;
            let outcome = orchestrator.deploy_with_migration(&plan, &from).await;
            if !outcome.deployed {
                bail!("deployment of {} failed, nothing migrated", release_container);
            }
            for report in &outcome.reports {
                println!(
                    "{} {}",
                    report.process_instance_id,
                    if report.success { "migrated" } else { "failed" }
                );
            }
            let failed = outcome.failed().count();
            if failed > 0 {
                bail!("{} of {} instances failed to migrate", failed, outcome.reports.len());
            }
        }
        Commands::Containers => {
            let containers = orchestrator.containers().list_containers().await?;
            println!("{}", serde_json::to_string_pretty(&containers)?);
        }
        Commands::Instances { container_id } => {
            let container_id = container_id.unwrap_or(release_container);
            let instances = orchestrator
                .containers()
                .list_active_instances(&container_id)
                .await?;
            println!("{}", serde_json::to_string_pretty(&instances)?);
        }
    }

    Ok(())
}
